//! # Leadflow — Marketing Automation Core
//!
//! Wires the four subsystems together and runs them as one process:
//! workflow engine, lead scoring, cron scheduler, and the durable job
//! queues with their workers.
//!
//! Usage:
//!   leadflow                         # Start with ~/.leadflow/config.toml
//!   leadflow --config ./dev.toml     # Custom config
//!   leadflow --demo                  # Seed demo data and fire a scenario

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use clap::Parser;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use leadflow_core::{
    EmailMessage, EmailSender, Lead, LeadflowConfig, LeadflowError, MemoryStore, ProviderReceipt,
    RecordStore, SocialAccount, SocialPost, SocialPublisher, TokenStore,
};
use leadflow_engine::{
    Action, ActionKind, Trigger, Workflow, WorkflowEngine, default_workflows, handler_fn,
};
use leadflow_queue::{
    EmailJobData, EmailProcessor, JobQueue, QueueDb, QueueService, SmtpEmailSender,
    SocialProcessor, WorkerPool,
};
use leadflow_scheduler::Scheduler;
use leadflow_scoring::{LeadScoringEngine, default_rules};

#[derive(Parser)]
#[command(
    name = "leadflow",
    version,
    about = "🎯 Leadflow — workflow engine, lead scoring, scheduler, job queues"
)]
struct Cli {
    /// Config file (default: ~/.leadflow/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Queue database path (default: ~/.leadflow/queue.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Seed demo records and fire a demo scenario on startup
    #[arg(long)]
    demo: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Logs instead of sending. Used when no SMTP sender is configured.
struct ConsoleEmailSender;

#[async_trait]
impl EmailSender for ConsoleEmailSender {
    async fn send(&self, message: &EmailMessage) -> leadflow_core::Result<ProviderReceipt> {
        tracing::info!(
            "📧 [console] to={} subject='{}' ({} chars)",
            message.to,
            message.subject,
            message.body.len()
        );
        Ok(ProviderReceipt {
            provider_id: uuid(),
            url: None,
        })
    }
}

/// Logs instead of calling a provider SDK. Real platform integrations plug
/// in through [`SocialPublisher`] at this seam.
struct ConsolePublisher;

#[async_trait]
impl SocialPublisher for ConsolePublisher {
    async fn publish(
        &self,
        post: &SocialPost,
        account: &SocialAccount,
    ) -> leadflow_core::Result<ProviderReceipt> {
        tracing::info!(
            "📣 [console] publish post {} as {} on {}",
            post.id,
            account.handle,
            account.platform
        );
        let id = uuid();
        Ok(ProviderReceipt {
            url: Some(format!("https://{}/posts/{id}", account.platform)),
            provider_id: id,
        })
    }
}

/// Stamps a fresh expiry on the existing token. Real OAuth refresh lives
/// behind [`TokenStore`] in the provider integration.
struct ConsoleTokenRefresher;

#[async_trait]
impl TokenStore for ConsoleTokenRefresher {
    async fn refresh(&self, account: &SocialAccount) -> leadflow_core::Result<SocialAccount> {
        tracing::info!("🔑 [console] refreshing token for {}", account.handle);
        let mut fresh = account.clone();
        fresh.token_expires_at = Some(chrono::Utc::now() + chrono::Duration::hours(1));
        Ok(fresh)
    }
}

fn uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "leadflow=debug"
    } else {
        "leadflow=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => LeadflowConfig::load_from(path)?,
        None => LeadflowConfig::load()?,
    };

    let db_path = cli
        .db
        .unwrap_or_else(|| LeadflowConfig::home_dir().join("queue.db"));
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Arc::new(QueueDb::open(&db_path)?);

    println!("🎯 Leadflow v{}", env!("CARGO_PKG_VERSION"));
    println!("   🗄️  Queue DB:     {}", db_path.display());
    println!(
        "   📧 Email queue:  {} workers, {}/s, {} attempts",
        config.email_queue.concurrency,
        config.email_queue.rate_limit_per_sec,
        config.email_queue.attempts
    );
    println!(
        "   📣 Social queue: {} workers, {}/s, {} attempts",
        config.social_queue.concurrency,
        config.social_queue.rate_limit_per_sec,
        config.social_queue.attempts
    );
    println!();

    // Record store (in-memory; a real deployment plugs its database in here)
    let store = MemoryStore::new();

    // Workflow engine with the preset automations
    let engine = WorkflowEngine::new();
    for workflow in default_workflows() {
        engine.register_workflow(workflow).await;
    }

    // Scoring engine with the preset rules
    let scoring = Arc::new(LeadScoringEngine::new());
    for rule in default_rules() {
        scoring.register_rule(rule);
    }

    // Durable queues and the producer facade
    let email_queue = JobQueue::new(
        "emails",
        &config.email_queue,
        config.retention.clone(),
        Some(Arc::clone(&db)),
    )?;
    let social_queue = JobQueue::new(
        "social-posts",
        &config.social_queue,
        config.retention.clone(),
        Some(Arc::clone(&db)),
    )?;
    let service = QueueService::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::clone(&email_queue),
        Arc::clone(&social_queue),
    );

    // Heavy actions enqueue instead of blocking the execution
    {
        let svc = Arc::clone(&service);
        engine
            .register_handler(
                ActionKind::SendEmail,
                handler_fn(move |config, data| {
                    let svc = Arc::clone(&svc);
                    async move {
                        let to = data["email"].as_str().unwrap_or_default().to_string();
                        if to.is_empty() {
                            return Err(LeadflowError::Workflow(
                                "send_email: no 'email' in trigger data".into(),
                            ));
                        }
                        let job_id = svc
                            .queue_email(EmailJobData {
                                to,
                                subject: config["subject"].as_str().map(String::from),
                                body: config["body"].as_str().map(String::from),
                                campaign_id: config["campaignId"].as_str().map(String::from),
                                lead_id: data["leadId"].as_str().map(String::from),
                            })
                            .await?;
                        Ok(json!({"emailQueued": true, "emailJobId": job_id}))
                    }
                }),
            )
            .await;

        let svc = Arc::clone(&service);
        engine
            .register_handler(
                ActionKind::PostToSocial,
                handler_fn(move |config, data| {
                    let svc = Arc::clone(&svc);
                    async move {
                        let post_id = config["postId"]
                            .as_str()
                            .or_else(|| data["postId"].as_str())
                            .unwrap_or_default()
                            .to_string();
                        if post_id.is_empty() {
                            return Err(LeadflowError::Workflow(
                                "post_to_social: no 'postId' in config or data".into(),
                            ));
                        }
                        let job_id = svc.queue_social_post(&post_id).await?;
                        Ok(json!({"postQueued": true, "postJobId": job_id}))
                    }
                }),
            )
            .await;
    }

    // Workers: real SMTP when configured, console sender otherwise
    let sender: Arc<dyn EmailSender> = if config.smtp.from_email.is_empty() {
        tracing::warn!("⚠️ No smtp.from_email configured, emails go to the log");
        Arc::new(ConsoleEmailSender)
    } else {
        Arc::new(SmtpEmailSender::new(&config.smtp)?)
    };
    let email_processor = EmailProcessor::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        sender,
        &config.smtp,
    );
    let social_processor = SocialProcessor::new(
        Arc::clone(&store) as Arc<dyn RecordStore>,
        Arc::new(ConsolePublisher),
        Arc::new(ConsoleTokenRefresher),
    );

    let mut pool = WorkerPool::new();
    pool.start(Arc::clone(&email_queue), email_processor, &config.email_queue);
    pool.start(
        Arc::clone(&social_queue),
        social_processor,
        &config.social_queue,
    );

    // Daily digest at 08:00, driven by the cron scheduler
    engine
        .register_workflow(Workflow::new(
            "wf_daily_digest",
            "Daily Digest",
            Trigger::on("time_based")
                .with_conditions(json!({"workflowId": {"$eq": "wf_daily_digest"}})),
            vec![Action::new(
                "notify_digest",
                ActionKind::SendNotification,
                json!({"message": "Daily digest: check your pipeline"}),
            )],
        ))
        .await;
    let scheduler = Scheduler::with_config(Arc::clone(&engine), &config.scheduler);
    scheduler.schedule("wf_daily_digest", "0 8 * * *", None).await?;

    // Re-queue anything that was pending before the last shutdown
    let requeued = service.queue_pending_posts().await?;
    if !requeued.is_empty() {
        tracing::info!("🔄 Re-queued {} pending post(s)", requeued.len());
    }

    if cli.demo {
        run_demo(&store, &engine, &scoring, &service).await?;
    }

    println!("✅ Leadflow running. Press Ctrl+C to stop.\n");
    tokio::signal::ctrl_c().await?;
    println!("\n🛑 Shutting down...");

    scheduler.stop_all().await;
    pool.shutdown().await;

    let email_stats = service.email_stats().await;
    let social_stats = service.social_stats().await;
    println!(
        "   📧 Emails: {} completed, {} failed, {} pending",
        email_stats.completed,
        email_stats.failed,
        email_stats.waiting + email_stats.delayed
    );
    println!(
        "   📣 Posts:  {} completed, {} failed, {} pending",
        social_stats.completed,
        social_stats.failed,
        social_stats.waiting + social_stats.delayed
    );
    Ok(())
}

/// Seed a lead, a campaign, a post, and an account, then fire the new-lead
/// workflow and run a scoring pass.
async fn run_demo(
    store: &Arc<MemoryStore>,
    engine: &Arc<WorkflowEngine>,
    scoring: &Arc<LeadScoringEngine>,
    service: &Arc<QueueService>,
) -> Result<()> {
    println!("🧪 Demo scenario\n");

    let mut lead = Lead::new("lead-demo", "dana@acme.example");
    lead.first_name = "Dana".into();
    lead.company = "Acme".into();
    lead.job_title = "CTO".into();
    lead.company_size = "enterprise".into();
    store.insert_lead(lead.clone()).await;

    store
        .insert_campaign(leadflow_core::Campaign {
            id: "camp-welcome".into(),
            name: "Welcome".into(),
            subject: "Welcome to Leadflow".into(),
            body: "Glad to have you on board.".into(),
            from_name: "Leadflow".into(),
            from_email: "hello@leadflow.dev".into(),
        })
        .await;

    store
        .insert_account(SocialAccount {
            id: "acc-demo".into(),
            platform: "linkedin".into(),
            handle: "@leadflow".into(),
            access_token: "demo-token".into(),
            refresh_token: "demo-refresh".into(),
            token_expires_at: Some(chrono::Utc::now() + chrono::Duration::hours(1)),
        })
        .await;

    store
        .insert_post(SocialPost {
            id: "post-demo".into(),
            account_id: "acc-demo".into(),
            platform: "linkedin".into(),
            content: "We just shipped Leadflow 0.2!".into(),
            status: leadflow_core::PostStatus::Draft,
            scheduled_at: None,
            published_at: None,
            provider_post_id: None,
            provider_url: None,
            last_error_code: None,
            last_error_message: None,
            retry_count: 0,
        })
        .await;

    // Fire the new-lead workflow (welcome email, sales notification)
    let executions = engine
        .trigger(
            "lead_created",
            json!({
                "leadId": lead.id,
                "email": lead.email,
                "firstName": lead.first_name,
            }),
        )
        .await;
    println!("   ⚡ lead_created fired {} execution(s)", executions.len());

    // Score the lead on a couple of engagement events
    scoring.calculate_score(&mut lead, &json!({"event": "email_opened"}));
    scoring.calculate_score(
        &mut lead,
        &json!({"event": "page_visited", "page": "pricing"}),
    );
    store.update_lead(lead.clone()).await?;
    println!(
        "   🎯 Lead '{}' scored {} (grade {}, {} event(s))",
        lead.id,
        lead.score,
        lead.grade,
        lead.scoring_history.len()
    );

    // Publish the demo post through the social queue
    service.queue_social_post("post-demo").await?;
    println!("   📣 Post 'post-demo' queued for publish\n");
    Ok(())
}

//! Metis console
//!
//! Thin interactive surface over the orchestration engine: reads user
//! lines, hands them to the engine, and renders the engine's ordered
//! event sequence (streamed tokens, step progress, final summary).

use anyhow::Result;
use clap::Parser;
use metis_core::{
    resolve_session, Engine, EngineConfig, EngineEvent, RoleBindings, RunOutcome,
    SessionOptions, SessionStore, SqliteSessionStore,
};
use metis_llm::{LlmProvider, OpenAiCompatProvider};
use metis_skills::{builtins, SkillRegistry};
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::AsyncBufReadExt;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "metis",
    version,
    about = "Skill-driven assistant with a plan/execute/evaluate engine"
)]
struct Args {
    /// Directory tree to scan for skills
    #[arg(long, default_value = "skills")]
    skills_dir: PathBuf,

    /// Reload every skill, bypassing the cache
    #[arg(long)]
    force_reload: bool,

    /// Keep the default conversation from previous runs
    #[arg(long)]
    reuse_session: bool,

    /// Explicit session id
    #[arg(long)]
    session: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let provider: Arc<dyn LlmProvider> = Arc::new(OpenAiCompatProvider::from_env()?);
    let store: Arc<dyn SessionStore> = Arc::new(SqliteSessionStore::new_default().await?);

    let registry = SkillRegistry::new(builtins::default_handlers());
    let skills = registry.scan(&args.skills_dir, args.force_reload).await?;
    tracing::info!(count = skills.len(), "skills ready");

    let mut engine = Engine::new(
        provider,
        RoleBindings::bind(&skills),
        Arc::clone(&store),
        EngineConfig::default(),
    );

    let session_id = resolve_session(
        store.as_ref(),
        &SessionOptions {
            reuse: args.reuse_session,
            id: args.session.clone(),
        },
    )
    .await?;

    let mut events = engine.events().subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => render_event(event),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    println!("Metis: hello! I can chat, and I can run tasks for you.");
    println!("Metis: type 'exit' to quit, ':reload' to rescan skills.");
    println!("{}", "=".repeat(50));

    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\nyou: ");
        let _ = std::io::stdout().flush();

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        if input.is_empty() {
            println!("please enter something");
            continue;
        }
        if input.eq_ignore_ascii_case("exit") {
            println!("Metis: goodbye!");
            break;
        }
        if input == ":reload" {
            let skills = registry.scan(&args.skills_dir, true).await?;
            engine.rebind(RoleBindings::bind(&skills));
            println!("Metis: reloaded {} skill(s)", skills.len());
            continue;
        }

        print!("Metis: ");
        let _ = std::io::stdout().flush();

        match engine.handle_input(&session_id, input).await {
            Ok(RunOutcome::Chat { .. }) => println!(),
            Ok(RunOutcome::Plan { .. }) => {}
            Err(e) => println!("\nMetis: something went wrong: {e}"),
        }

        println!("{}", "=".repeat(50));
    }

    drop(engine);
    let _ = printer.await;
    Ok(())
}

fn render_event(event: EngineEvent) {
    match event {
        EngineEvent::PlanToken { token } | EngineEvent::ChatToken { token } => {
            print!("{token}");
            let _ = std::io::stdout().flush();
        }
        EngineEvent::PlanAnnounced { tasks } => {
            println!("\n\nI need to run the following tasks:");
            for (i, task) in tasks.iter().enumerate() {
                println!("{}. {task}", i + 1);
            }
        }
        EngineEvent::StepStarted { index, total, task } => {
            println!("\ntask {}/{total}: {task}", index + 1);
        }
        EngineEvent::AttemptStarted {
            attempt,
            max_attempts,
            ..
        } => {
            println!("  attempt {attempt}/{max_attempts}");
        }
        EngineEvent::ToolInvoked { tool } => {
            println!("  using skill: {tool}");
        }
        EngineEvent::StepCompleted { result, .. } => {
            println!("  done: {}", preview(&result));
        }
        EngineEvent::StepFailed { error, .. } => {
            println!("  failed: {error}");
        }
        EngineEvent::Summary { summary } => {
            println!("\ntask summary:");
            for (i, step) in summary.steps.iter().enumerate() {
                if step.completed {
                    println!("  [ok] task {}: complete", i + 1);
                } else {
                    println!("  [x]  task {}: failed - {}", i + 1, step.error_message);
                }
            }
            if summary.all_complete {
                println!("\nall tasks completed.");
            } else {
                println!("\nsome tasks failed:");
                for failure in summary.failures() {
                    println!("- {}: {}", failure.task, failure.error_message);
                }
            }
        }
    }
}

fn preview(text: &str) -> String {
    const MAX_CHARS: usize = 100;
    if text.chars().count() <= MAX_CHARS {
        text.to_string()
    } else {
        let cut: String = text.chars().take(MAX_CHARS).collect();
        format!("{cut}...")
    }
}

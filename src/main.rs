use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xkbot::config::AppConfig;
use xkbot::db::{CourseStore, SqliteStorage};
use xkbot::error::AppError;
use xkbot::events::{EngineEvent, EventBus};
use xkbot::models::CourseType;
use xkbot::portal::XkHttpClient;
use xkbot::services::RegistrationEngine;

const HELP: &str = "\
commands:
  add <id> <TYPE> [name]     track a course
  rm <id>                    stop tracking a course
  mv <old> <new> <TYPE>      replace a course id
  name <id> <name>           rename a course
  start | stop | once        control polling
  status | types | reset | help | quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "xkbot=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::new_from_env()?;
    info!("portal api at {}", config.base_url());

    let store = match SqliteStorage::connect(&config.database_url).await {
        Ok(storage) => CourseStore::new(Arc::new(storage)),
        Err(e) => {
            warn!("cannot open {}: {}; progress will not survive a restart", config.database_url, e);
            CourseStore::detached()
        }
    };

    let client = Arc::new(XkHttpClient::new(
        config.cookie.as_deref(),
        config.request_timeout,
    )?);
    let events = EventBus::new();
    let engine = RegistrationEngine::new(config.engine_settings(), client, store, events.clone());

    tokio::spawn(render_events(events.subscribe()));
    engine.restore().await;

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line? {
                    Some(line) => {
                        if !handle_command(&engine, line.trim()).await {
                            break;
                        }
                    }
                    None => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }

    if engine.is_running().await {
        engine.stop_loop().await;
    }
    Ok(())
}

/// Returns false when the user asked to quit.
async fn handle_command(engine: &RegistrationEngine, line: &str) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        return true;
    };
    let args: Vec<&str> = parts.collect();

    let result: Result<(), AppError> = match (command, args.as_slice()) {
        ("add", [id, kind, name @ ..]) => match kind.parse::<CourseType>() {
            Ok(course_type) => {
                let added = engine.add_course(id, course_type).await;
                if added.is_ok() && !name.is_empty() {
                    engine.update_course_name(id, &name.join(" ")).await
                } else {
                    added
                }
            }
            Err(e) => Err(e),
        },
        ("rm", [id]) => engine.remove_course(id).await,
        ("mv", [old, new, kind]) => match kind.parse::<CourseType>() {
            Ok(course_type) => engine.update_course(old, new, course_type).await,
            Err(e) => Err(e),
        },
        ("name", [id, name @ ..]) => engine.update_course_name(id, &name.join(" ")).await,
        ("start", []) => {
            engine.start().await;
            Ok(())
        }
        ("stop", []) => {
            engine.stop_loop().await;
            Ok(())
        }
        ("once", []) => {
            engine.poll_once().await;
            Ok(())
        }
        ("reset", []) => {
            engine.reset().await;
            Ok(())
        }
        ("status", []) => {
            print_status(engine).await;
            Ok(())
        }
        ("types", []) => {
            for t in CourseType::ALL {
                let info = t.info();
                println!("  {:<6} {}  {}", info.key, info.label, info.description);
            }
            Ok(())
        }
        ("quit" | "exit", []) => return false,
        _ => {
            println!("{}", HELP);
            Ok(())
        }
    };

    if let Err(e) = result {
        if e.is_user_input() {
            println!("  ! {}", e);
        } else {
            error!("{} failed: {}", command, e);
        }
    }
    true
}

async fn print_status(engine: &RegistrationEngine) {
    let status = engine.get_status().await;
    println!(
        "  running={} total={} succeeded={} pending={}",
        status.running, status.total, status.success_count, status.pending_count
    );
    for course in status.courses {
        println!(
            "  {:<16} {:<6} {:<4} fallback {}/{} {}",
            course.id,
            course.course_type,
            if course.success { "ok" } else { "..." },
            course.fallback_attempt_index,
            course.fallback_classes,
            course.name
        );
    }
}

async fn render_events(mut rx: broadcast::Receiver<EngineEvent>) {
    loop {
        match rx.recv().await {
            Ok(EngineEvent::CourseSucceeded { id, course_type, timestamp }) => {
                info!("✓ {} ({}) registered at {}", id, course_type, timestamp);
            }
            Ok(EngineEvent::DataLoaded { courses, .. }) => {
                info!("loaded {} saved courses", courses.len());
            }
            Ok(event) => info!("{}", event.name()),
            Err(RecvError::Lagged(n)) => warn!("missed {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}

//! Per-invocation request pipeline.
//!
//! One run goes: resolve settings and model, assemble the prompt, prepend
//! session history, consult the cache, check the budget, dispatch through
//! the retry loop, then persist (budget, session, cache) and emit output.
//! Persistence only happens for a completed turn; a failed or interrupted
//! request leaves every store untouched.

use std::io::Write;
use std::path::Path;

use futures::StreamExt;
use serde::Serialize;

use crate::backend::{Backend, ChatRequest, ChatResponse, Message, Role, StreamEvent, Usage};
use crate::cli::args::AskArgs;
use crate::core::budget::{estimate_cost, BudgetGuard};
use crate::core::fingerprint::fingerprint;
use crate::core::prompt::{assemble, PromptInput};
use crate::core::retry::{self, RetryPolicy};
use crate::error::{QuillError, Result};
use crate::storage::session::Session;
use crate::storage::{AppPaths, KeyStore, ResolvedSettings, ResponseCache, SessionStore, Settings};

/// Result payload for `--json` output.
#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    text: &'a str,
    model: String,
    usage: Option<Usage>,
    finish_reason: Option<&'a crate::backend::FinishReason>,
    cost_usd: f64,
    cached: bool,
}

/// Run one prompt end to end.
///
/// `stdin` is the piped input, already read by the caller (reading and TTY
/// detection stay at the CLI edge so this function is testable).
pub async fn run(args: &AskArgs, config_dir: Option<&Path>, stdin: Option<String>) -> Result<()> {
    let paths = AppPaths::resolve(config_dir);
    let settings = Settings::load(&paths.settings_file());
    let resolved = ResolvedSettings::resolve(args, &settings)?;
    tracing::debug!(model = %resolved.model, stream = resolved.stream, "resolved request settings");

    let prompt = assemble(&PromptInput {
        args: args.prompt.clone(),
        files: args.files.clone(),
        images: args.images.clone(),
        stdin,
        has_system: resolved.system.is_some(),
    })?;

    let store = SessionStore::new(&paths);
    let mut session = match &args.session {
        Some(name) => Some(store.load(name)?),
        None => None,
    };

    let mut messages = session.as_ref().map(Session::history).unwrap_or_default();
    messages.push(Message::user(prompt.text.clone()));

    let request = ChatRequest {
        model: resolved.model.model.clone(),
        system: resolved.system.clone(),
        messages,
        images: prompt.images,
        temperature: resolved.temperature,
        max_output_tokens: resolved.max_output_tokens,
    };

    let provider = resolved.model.provider;
    let model_label = resolved.model.to_string();
    let fp = fingerprint(provider, &request);

    // Cache hit short-circuits everything network-side; the session still
    // records the exchange.
    let cache = ResponseCache::new(&paths);
    if !args.no_cache {
        if let Some(entry) = cache.lookup(&fp) {
            tracing::debug!(fingerprint = %fp, "cache hit");
            let response = entry.response();
            emit(args, &model_label, &response, 0.0, true)?;
            if let Some(session) = &mut session {
                record_turn(session, &prompt.text, &response.text);
                store.save(session)?;
            }
            return Ok(());
        }
    }

    let estimate = estimate_cost(provider, &request);
    let mut budget = args.budget.map(|limit| {
        if let Some(session) = &session {
            BudgetGuard::cumulative(limit, session.cumulative_cost)
        } else {
            BudgetGuard::per_request(limit)
        }
    });
    if let Some(budget) = &budget {
        budget.pre_check(estimate)?;
    }

    let keys = KeyStore::load(&paths.keys_file());
    let api_key = provider.require_key(&keys)?;
    let backend = Backend::connect(&resolved.model, api_key, resolved.api_base.clone())?;
    let policy = RetryPolicy::new(args.retries.unwrap_or(retry::DEFAULT_RETRIES));

    // --json needs the complete payload, so it always buffers.
    let streamed = resolved.stream && !args.json;
    let response = if streamed {
        stream_response(&backend, &request, policy).await?
    } else {
        retry::execute(policy, || backend.send(&request)).await?
    };

    let actual = response
        .usage
        .map_or(estimate, |usage| crate::core::pricing::cost(provider, &request.model, usage));
    if let Some(budget) = &mut budget {
        budget.post_update(actual);
    }
    if !streamed {
        emit(args, &model_label, &response, actual, false)?;
    }

    if let Some(session) = &mut session {
        record_turn(session, &prompt.text, &response.text);
        session.cumulative_cost += actual;
        store.save(session)?;
    }
    if !args.no_cache {
        cache.store(&fp, &response);
    }
    Ok(())
}

fn record_turn(session: &mut Session, prompt: &str, response: &str) {
    session.push_turn(Role::User, prompt);
    session.push_turn(Role::Assistant, response);
}

/// Stream the response to stdout as it arrives.
///
/// The retry loop only covers establishing the stream; once deltas have
/// been printed a mid-stream failure is surfaced rather than replayed.
/// Ctrl-C stops forwarding, keeps the partial text on screen, and aborts
/// the run before any store is written.
async fn stream_response(
    backend: &Backend,
    request: &ChatRequest,
    policy: RetryPolicy,
) -> Result<ChatResponse> {
    let mut stream = retry::execute(policy, || backend.stream(request)).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let mut stdout = std::io::stdout();
    let mut text = String::new();
    let mut usage = None;
    let mut finish_reason = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                if !text.is_empty() {
                    let _ = writeln!(stdout);
                }
                return Err(QuillError::Interrupted);
            }
            event = stream.next() => match event {
                Some(Ok(StreamEvent::Delta(delta))) => {
                    write!(stdout, "{delta}")?;
                    stdout.flush()?;
                    text.push_str(&delta);
                }
                Some(Ok(StreamEvent::Done { usage: u, finish_reason: reason })) => {
                    usage = u;
                    finish_reason = reason;
                    break;
                }
                Some(Err(err)) => {
                    if !text.is_empty() {
                        let _ = writeln!(stdout);
                    }
                    return Err(err);
                }
                None => break,
            }
        }
    }

    if !text.ends_with('\n') {
        writeln!(stdout)?;
    }
    Ok(ChatResponse {
        text,
        usage,
        finish_reason,
    })
}

/// Print a buffered response to stdout, as text or as a JSON object.
fn emit(args: &AskArgs, model: &str, response: &ChatResponse, cost: f64, cached: bool) -> Result<()> {
    let mut stdout = std::io::stdout();
    if args.json {
        let output = RunOutput {
            text: &response.text,
            model: model.to_string(),
            usage: response.usage,
            finish_reason: response.finish_reason.as_ref(),
            cost_usd: cost,
            cached,
        };
        writeln!(stdout, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        writeln!(stdout, "{}", response.text.trim_end_matches('\n'))?;
    }
    Ok(())
}

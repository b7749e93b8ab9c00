//! Spend limits for a run or a session.

use crate::backend::{ChatRequest, Usage};
use crate::core::pricing;
use crate::core::provider::Provider;
use crate::error::{QuillError, Result};

/// Rough chars-per-token ratio for English text.
const CHARS_PER_TOKEN: u64 = 4;
/// Flat token charge assumed per attached image.
const TOKENS_PER_IMAGE: u64 = 1_000;
/// Smallest plausible response, for the pre-dispatch estimate.
const MIN_RESPONSE_TOKENS: u64 = 32;

/// How spend is counted against the limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetMode {
    /// Each invocation is checked alone; nothing carries over.
    PerRequest,
    /// Actual spend accumulates across a session.
    Cumulative,
}

/// Enforces a USD spend limit around a request.
///
/// `pre_check` rejects before any network traffic; `post_update` records
/// what the request actually cost. The estimate is deliberately rough
/// (see [`estimate_cost`]) and only exists so an obviously over-budget
/// request fails fast.
#[derive(Debug, Clone)]
pub struct BudgetGuard {
    limit: f64,
    spent: f64,
    mode: BudgetMode,
}

impl BudgetGuard {
    /// Guard a single invocation.
    #[must_use]
    pub const fn per_request(limit: f64) -> Self {
        Self {
            limit,
            spent: 0.0,
            mode: BudgetMode::PerRequest,
        }
    }

    /// Guard a session, resuming from spend recorded in its file.
    #[must_use]
    pub const fn cumulative(limit: f64, already_spent: f64) -> Self {
        Self {
            limit,
            spent: already_spent,
            mode: BudgetMode::Cumulative,
        }
    }

    /// Reject the request if the projected total would exceed the limit.
    ///
    /// # Errors
    ///
    /// Returns [`QuillError::BudgetExceeded`] with the projected figure,
    /// spend so far, and the limit.
    pub fn pre_check(&self, estimate: f64) -> Result<()> {
        let projected = match self.mode {
            BudgetMode::PerRequest => estimate,
            BudgetMode::Cumulative => self.spent + estimate,
        };
        if projected > self.limit {
            return Err(QuillError::BudgetExceeded {
                projected,
                spent: self.spent,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Record actual spend after a successful request.
    pub fn post_update(&mut self, actual: f64) {
        self.spent += actual;
    }

    /// Spend recorded so far (persisted back to the session in cumulative
    /// mode).
    #[must_use]
    pub const fn spent(&self) -> f64 {
        self.spent
    }
}

/// Estimate the cost of a request before dispatch.
///
/// Input tokens from prompt length at roughly four characters per token
/// plus a flat charge per image; output priced at the smallest plausible
/// response rather than the cap, so a generous `max_tokens` doesn't block a
/// cheap request.
#[must_use]
pub fn estimate_cost(provider: Provider, request: &ChatRequest) -> f64 {
    let prompt_chars: u64 = request
        .messages
        .iter()
        .map(|m| m.content.len() as u64)
        .chain(request.system.as_ref().map(|s| s.len() as u64))
        .sum();
    let input_tokens = prompt_chars.div_ceil(CHARS_PER_TOKEN)
        + request.images.len() as u64 * TOKENS_PER_IMAGE;
    let usage = Usage {
        input_tokens,
        output_tokens: MIN_RESPONSE_TOKENS,
    };
    pricing::cost(provider, &request.model, usage)
}

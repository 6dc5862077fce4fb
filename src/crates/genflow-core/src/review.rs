//! Second-opinion review of structurally valid payloads
//!
//! A [`Reviewer`] runs after the [`Validator`](crate::validate::Validator)
//! has accepted a payload's shape. It answers the question a schema cannot:
//! is this actually good? A typical reviewer is another model call that
//! inspects generated code or prose and returns concrete complaints.
//!
//! A rejection is treated exactly like a validation failure. The attempt
//! counts against the budget and the review feedback is threaded into the
//! next attempt's request.

use crate::error::GenerationError;
use crate::generator::GenerationRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Verdict returned by a [`Reviewer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub approved: bool,

    /// Reviewer comments; forwarded as feedback when not approved.
    #[serde(default)]
    pub feedback: String,
}

impl Review {
    pub fn approve() -> Self {
        Self {
            approved: true,
            feedback: String::new(),
        }
    }

    pub fn reject(feedback: impl Into<String>) -> Self {
        Self {
            approved: false,
            feedback: feedback.into(),
        }
    }
}

/// Judges a validated payload for the original request.
///
/// A reviewer error is counted as a failed attempt, the same as a generator
/// fault.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn review(
        &self,
        request: &GenerationRequest,
        payload: &Value,
    ) -> Result<Review, GenerationError>;
}

#[async_trait]
impl<R: Reviewer + ?Sized> Reviewer for Arc<R> {
    async fn review(
        &self,
        request: &GenerationRequest,
        payload: &Value,
    ) -> Result<Review, GenerationError> {
        (**self).review(request, payload).await
    }
}

/// Adapter turning an async closure into a [`Reviewer`].
pub struct FnReviewer<F> {
    func: F,
}

impl<F> FnReviewer<F> {
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> Reviewer for FnReviewer<F>
where
    F: Fn(GenerationRequest, Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Review, GenerationError>> + Send,
{
    async fn review(
        &self,
        request: &GenerationRequest,
        payload: &Value,
    ) -> Result<Review, GenerationError> {
        (self.func)(request.clone(), payload.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_review_deserializes_without_feedback() {
        let review: Review = serde_json::from_value(json!({"approved": true})).unwrap();
        assert_eq!(review, Review::approve());
    }

    #[tokio::test]
    async fn test_fn_reviewer() {
        let reviewer = FnReviewer::new(|_req: GenerationRequest, payload: Value| async move {
            if payload.get("code").is_some() {
                Ok(Review::approve())
            } else {
                Ok(Review::reject("no code block"))
            }
        });

        let request = GenerationRequest::new("snake game");
        let ok = reviewer.review(&request, &json!({"code": "x"})).await.unwrap();
        let bad = reviewer.review(&request, &json!({})).await.unwrap();

        assert!(ok.approved);
        assert_eq!(bad, Review::reject("no code block"));
    }
}

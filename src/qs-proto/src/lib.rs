// Licensed under the Apache License, Version 2.0. See LICENSE for details.

//! Wire request/response shapes for the operations surface
//! (`generate-sets`, `allocate`, `merge`). No transport lives here —
//! `qs-server` terminates HTTP, the admin CLI terminates a terminal; both
//! share these types so the shape of a request is defined exactly once.
//!
//! Validation happens at construction (`TryFrom`/a `new` constructor
//! returning [`ValidationError`]), not scattered across handlers.

use std::collections::BTreeMap;

use qs_allocator::AllocationFailure;
use qs_types::{CategoryId, SetId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Input validation failures, surfaced as 4xx-class by any transport.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A count field that must be strictly positive was zero or negative.
    #[error("{field} must be a positive integer, got {value}")]
    NotPositive {
        /// The offending field's name.
        field: &'static str,
        /// The value that was rejected.
        value: i64,
    },
    /// `categoryIds` was empty.
    #[error("categoryIds must be a non-empty array")]
    EmptyCategoryIds,
    /// A category id was not among the known category table.
    #[error("unknown category id: {0}")]
    UnknownCategory(String),
    /// `userId` was empty.
    #[error("userId must be non-empty")]
    EmptyUserId,
}

/// `POST generate-sets` request. Executed asynchronously by the server;
/// the response only confirms acceptance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateSetsRequest {
    num_sets_per_category: u32,
    items_per_set: u32,
}

impl GenerateSetsRequest {
    /// Validates and constructs a request.
    pub fn new(num_sets_per_category: i64, items_per_set: i64) -> Result<Self, ValidationError> {
        if num_sets_per_category <= 0 {
            return Err(ValidationError::NotPositive {
                field: "numSetsPerCategory",
                value: num_sets_per_category,
            });
        }
        if items_per_set <= 0 {
            return Err(ValidationError::NotPositive {
                field: "itemsPerSet",
                value: items_per_set,
            });
        }
        Ok(Self {
            num_sets_per_category: num_sets_per_category as u32,
            items_per_set: items_per_set as u32,
        })
    }

    /// Validated `numSetsPerCategory`.
    pub fn num_sets_per_category(&self) -> u32 {
        self.num_sets_per_category
    }

    /// Validated `itemsPerSet`.
    pub fn items_per_set(&self) -> u32 {
        self.items_per_set
    }
}

/// `POST generate-sets` response: acceptance only, the build runs async.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GenerateSetsResponse {
    /// Always `true` — a rejected request fails validation instead.
    pub accepted: bool,
    /// Echo of the validated parameters.
    pub params: GenerateSetsRequest,
}

/// `POST allocate` request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocateRequest {
    user_id: UserId,
    category_ids: Vec<CategoryId>,
    /// Opaque passthrough for an upstream dedupe layer. The allocator
    /// never inspects this field — allocation is *not* idempotent, and
    /// this is not a dedupe key the core implements; it only exists so a
    /// caller-side dedupe layer has somewhere to stash its own key.
    pub request_id: Option<String>,
}

impl AllocateRequest {
    /// Validates and constructs a request against a known set of
    /// category ids (the category table loaded at startup).
    pub fn new(
        user_id: UserId,
        category_ids: Vec<CategoryId>,
        request_id: Option<String>,
        known_categories: &std::collections::BTreeSet<CategoryId>,
    ) -> Result<Self, ValidationError> {
        if user_id.0.trim().is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        if category_ids.is_empty() {
            return Err(ValidationError::EmptyCategoryIds);
        }
        for category in &category_ids {
            if !known_categories.contains(category) {
                return Err(ValidationError::UnknownCategory(category.0.clone()));
            }
        }
        Ok(Self {
            user_id,
            category_ids,
            request_id,
        })
    }

    /// The user this batch is for.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The categories to allocate against, in request order.
    pub fn category_ids(&self) -> &[CategoryId] {
        &self.category_ids
    }
}

/// `POST allocate` response summary counts.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct AllocateSummary {
    /// Categories requested.
    pub requested: usize,
    /// Categories that yielded a set-id.
    pub successful: usize,
    /// Categories that did not.
    pub failed: usize,
}

/// `POST allocate` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AllocateResponse {
    /// The user this response is for.
    pub user_id: UserId,
    /// Category id to set-id, for categories that succeeded.
    pub successful: BTreeMap<CategoryId, SetId>,
    /// Category id to failure reason, for categories that did not.
    pub failed: BTreeMap<CategoryId, AllocationFailure>,
    /// Request/success/failure counts.
    pub summary: AllocateSummary,
}

impl From<qs_allocator::BatchOutcome> for AllocateResponse {
    fn from(outcome: qs_allocator::BatchOutcome) -> Self {
        let (requested, successful, failed) = outcome.summary();
        Self {
            user_id: outcome.user_id,
            successful: outcome.successful,
            failed: outcome.failed,
            summary: AllocateSummary {
                requested,
                successful,
                failed,
            },
        }
    }
}

/// `POST merge` request. Surface only — content materialization is
/// delegated by `qs-server` to an injected trait object; the core does
/// not implement merging.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeRequest {
    user_id: UserId,
    category_ids: Vec<CategoryId>,
}

impl MergeRequest {
    /// Validates and constructs a request.
    pub fn new(user_id: UserId, category_ids: Vec<CategoryId>) -> Result<Self, ValidationError> {
        if user_id.0.trim().is_empty() {
            return Err(ValidationError::EmptyUserId);
        }
        if category_ids.is_empty() {
            return Err(ValidationError::EmptyCategoryIds);
        }
        Ok(Self { user_id, category_ids })
    }

    /// The user whose allocations are being merged.
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    /// The categories to merge, in request order.
    pub fn category_ids(&self) -> &[CategoryId] {
        &self.category_ids
    }
}

/// A single category's slice of a merge response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeCategoryItems {
    /// The set this category resolved to.
    pub set_id: SetId,
    /// Number of items in `items`.
    pub item_count: usize,
    /// The materialized items, in set order.
    pub items: Vec<serde_json::Value>,
}

/// `POST merge` response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergeResponse {
    /// Per-category materialized sets.
    pub categories: BTreeMap<CategoryId, MergeCategoryItems>,
    /// Every category's items flattened into one ordered list.
    pub all_items: Vec<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_sets_rejects_non_positive_counts() {
        assert_eq!(
            GenerateSetsRequest::new(0, 5).unwrap_err(),
            ValidationError::NotPositive {
                field: "numSetsPerCategory",
                value: 0
            }
        );
        assert_eq!(
            GenerateSetsRequest::new(3, -1).unwrap_err(),
            ValidationError::NotPositive {
                field: "itemsPerSet",
                value: -1
            }
        );
    }

    #[test]
    fn allocate_rejects_empty_user_id_and_empty_categories() {
        let known = std::collections::BTreeSet::from([CategoryId("cat-X".into())]);
        assert_eq!(
            AllocateRequest::new(UserId("".into()), vec![CategoryId("cat-X".into())], None, &known).unwrap_err(),
            ValidationError::EmptyUserId
        );
        assert_eq!(
            AllocateRequest::new(UserId("U".into()), vec![], None, &known).unwrap_err(),
            ValidationError::EmptyCategoryIds
        );
    }

    #[test]
    fn allocate_rejects_unknown_category() {
        let known = std::collections::BTreeSet::from([CategoryId("cat-X".into())]);
        let err = AllocateRequest::new(UserId("U".into()), vec![CategoryId("cat-Y".into())], None, &known).unwrap_err();
        assert_eq!(err, ValidationError::UnknownCategory("cat-Y".to_string()));
    }

    #[test]
    fn allocate_accepts_known_categories_and_preserves_order() {
        let known = std::collections::BTreeSet::from([CategoryId("a".into()), CategoryId("b".into())]);
        let req = AllocateRequest::new(
            UserId("U".into()),
            vec![CategoryId("b".into()), CategoryId("a".into())],
            Some("dedupe-123".into()),
            &known,
        )
        .unwrap();
        assert_eq!(req.category_ids(), &[CategoryId("b".into()), CategoryId("a".into())]);
    }
}

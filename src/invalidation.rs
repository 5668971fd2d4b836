//! Bulk invalidation across both tiers.
//!
//! Two matchers are offered:
//! - [`Invalidator::invalidate_pattern`]: raw substring containment. Cheap but
//!   coarse; `"blog"` also hits `"weblog_..."`.
//! - [`Invalidator::invalidate_namespace`]: hierarchical match on keys built
//!   as `domain:entity_<digest>`. `"blog"` hits `blog_*` and `blog:*` only.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::cache::TieredCache;

/// Separator between namespace segments.
pub const NAMESPACE_SEPARATOR: char = ':';

// == Cache Domain ==
/// Logical content domains of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheDomain {
    Blog,
    Products,
    Pages,
}

impl CacheDomain {
    pub fn namespace(&self) -> &'static str {
        match self {
            CacheDomain::Blog => "blog",
            CacheDomain::Products => "products",
            CacheDomain::Pages => "pages",
        }
    }

    /// Key prefix for an entity within this domain, e.g. `blog:list`.
    pub fn prefix(&self, entity: &str) -> String {
        format!("{}{NAMESPACE_SEPARATOR}{entity}", self.namespace())
    }
}

// == Invalidation Report ==
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InvalidationReport {
    pub memory_removed: usize,
    pub disk_removed: usize,
}

impl InvalidationReport {
    pub fn total(&self) -> usize {
        self.memory_removed + self.disk_removed
    }
}

/// Whether `key` lives in namespace `ns`: equal to it, or continuing it with
/// `:` (a sub-namespace) or `_` (a generated key suffix).
pub fn namespace_matches(ns: &str, key: &str) -> bool {
    match key.strip_prefix(ns) {
        Some("") => true,
        Some(rest) => rest.starts_with(NAMESPACE_SEPARATOR) || rest.starts_with('_'),
        None => false,
    }
}

// == Invalidator ==
/// Removes groups of entries from both tiers.
#[derive(Debug, Clone)]
pub struct Invalidator {
    cache: Arc<TieredCache>,
}

impl Invalidator {
    pub fn new(cache: Arc<TieredCache>) -> Self {
        Self { cache }
    }

    /// Removes every key containing `substring`. An empty pattern removes nothing.
    pub async fn invalidate_pattern(&self, substring: &str) -> InvalidationReport {
        if substring.is_empty() {
            warn!("Ignoring empty invalidation pattern");
            return InvalidationReport::default();
        }

        let (memory_removed, disk_removed) = self
            .cache
            .remove_matching(|key| key.contains(substring))
            .await;
        let report = InvalidationReport {
            memory_removed,
            disk_removed,
        };

        info!(
            pattern = substring,
            memory_removed, disk_removed, "Invalidated cache entries by pattern"
        );
        report
    }

    /// Removes every key in namespace `ns` (see [`namespace_matches`]).
    pub async fn invalidate_namespace(&self, ns: &str) -> InvalidationReport {
        if ns.is_empty() {
            warn!("Ignoring empty invalidation namespace");
            return InvalidationReport::default();
        }

        let (memory_removed, disk_removed) = self
            .cache
            .remove_matching(|key| namespace_matches(ns, key))
            .await;

        info!(
            namespace = ns,
            memory_removed, disk_removed, "Invalidated cache namespace"
        );
        InvalidationReport {
            memory_removed,
            disk_removed,
        }
    }

    pub async fn invalidate_domain(&self, domain: CacheDomain) -> InvalidationReport {
        self.invalidate_namespace(domain.namespace()).await
    }

    pub async fn invalidate_blog(&self) -> InvalidationReport {
        self.invalidate_domain(CacheDomain::Blog).await
    }

    pub async fn invalidate_products(&self) -> InvalidationReport {
        self.invalidate_domain(CacheDomain::Products).await
    }

    pub async fn invalidate_pages(&self) -> InvalidationReport {
        self.invalidate_domain(CacheDomain::Pages).await
    }
}

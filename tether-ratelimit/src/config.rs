//! Rate limiter configuration and builder

use crate::error::{RateLimitError, RateLimitResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the category used when none is given or an unknown one is requested.
pub const DEFAULT_CATEGORY: &str = "default";

/// Bucket parameters for one category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryLimit {
    /// Maximum number of tokens (burst capacity)
    pub capacity: f64,
    /// Tokens added per second
    pub refill_rate: f64,
}

impl CategoryLimit {
    /// Create new category parameters
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
        }
    }

    fn validate(&self, name: &str) -> RateLimitResult<()> {
        if !self.capacity.is_finite() || self.capacity < 0.0 {
            return Err(RateLimitError::config(format!(
                "category '{}' has invalid capacity {}",
                name, self.capacity
            )));
        }
        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            return Err(RateLimitError::config(format!(
                "category '{}' has invalid refill rate {}",
                name, self.refill_rate
            )));
        }
        Ok(())
    }
}

/// Configuration for the rate limiter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Bucket parameters per category
    pub categories: HashMap<String, CategoryLimit>,
    /// Category used for unknown category names
    pub default_category: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let categories = [
            (DEFAULT_CATEGORY, CategoryLimit::new(60.0, 1.0)),
            ("auth", CategoryLimit::new(5.0, 0.1)),
            ("chat", CategoryLimit::new(20.0, 0.5)),
            ("upload", CategoryLimit::new(10.0, 0.2)),
        ]
        .into_iter()
        .map(|(name, limit)| (name.to_string(), limit))
        .collect();

        Self {
            categories,
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }
}

impl RateLimitConfig {
    /// Create a new configuration builder with no categories
    pub fn builder() -> RateLimitConfigBuilder {
        RateLimitConfigBuilder::new()
    }

    /// Check that the default category exists and every category is well-formed
    pub fn validate(&self) -> RateLimitResult<()> {
        if !self.categories.contains_key(&self.default_category) {
            return Err(RateLimitError::config(format!(
                "default category '{}' is not defined",
                self.default_category
            )));
        }
        for (name, limit) in &self.categories {
            limit.validate(name)?;
        }
        Ok(())
    }

    /// Resolve a category name to the name actually used and its parameters.
    ///
    /// Unknown names fall back to the default category.
    pub fn resolve<'a>(&'a self, category: &'a str) -> Option<(&'a str, CategoryLimit)> {
        match self.categories.get(category) {
            Some(limit) => Some((category, *limit)),
            None => self
                .categories
                .get(&self.default_category)
                .map(|limit| (self.default_category.as_str(), *limit)),
        }
    }
}

/// Builder for [`RateLimitConfig`]
#[derive(Debug, Clone)]
pub struct RateLimitConfigBuilder {
    categories: HashMap<String, CategoryLimit>,
    default_category: String,
}

impl RateLimitConfigBuilder {
    /// Create a new builder with no categories
    pub fn new() -> Self {
        Self {
            categories: HashMap::new(),
            default_category: DEFAULT_CATEGORY.to_string(),
        }
    }

    /// Add or replace a category
    pub fn category(mut self, name: impl Into<String>, capacity: f64, refill_rate: f64) -> Self {
        self.categories
            .insert(name.into(), CategoryLimit::new(capacity, refill_rate));
        self
    }

    /// Set the fallback category
    pub fn default_category(mut self, name: impl Into<String>) -> Self {
        self.default_category = name.into();
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> RateLimitResult<RateLimitConfig> {
        let config = RateLimitConfig {
            categories: self.categories,
            default_category: self.default_category,
        };
        config.validate()?;
        Ok(config)
    }
}

impl Default for RateLimitConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Composition root: one instance of every data service
//!
//! Built once by `main` (or a test) and shared behind an `Arc`. Nothing in
//! the crate is a process-wide global.

use tracing::info;

use crate::config::AppConfig;
use crate::feed::ChangeFeed;
use crate::items::CuratedItemService;
use crate::mock;
use crate::targets::TargetService;
use crate::workflows::{runner_from_config, WorkflowService};
use crate::Result;

#[derive(Debug)]
pub struct AppContext {
    pub config: AppConfig,
    pub targets: TargetService,
    pub items: CuratedItemService,
    pub workflows: WorkflowService,
    pub feed: ChangeFeed,
}

impl AppContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;

        let runner = runner_from_config(&config.workflows)?;
        let context = Self {
            targets: TargetService::new(),
            items: CuratedItemService::new(),
            workflows: WorkflowService::new(runner, mock::workflows()),
            feed: ChangeFeed::new(config.web.feed_capacity),
            config,
        };

        context.feed.attach(context.targets.store());
        context.feed.attach(context.items.store());
        context.feed.attach(context.workflows.store());

        if context.config.seed.enabled {
            context.targets.seed(mock::seed_targets())?;
            context.items.seed(mock::seed_items())?;
            info!(
                "Seeded {} targets and {} curated items",
                context.targets.list().len(),
                context.items.list().len()
            );
        }

        info!("Workflow runner: {}", context.workflows.runner_name());
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunnerKind;
    use crate::hub::Topic;

    #[test]
    fn test_seeded_context() {
        let context = AppContext::new(AppConfig::default()).unwrap();
        assert_eq!(context.targets.list().len(), 3);
        assert_eq!(context.items.list().len(), 3);
        assert!(context.workflows.list_runs().is_empty());
        assert_eq!(context.feed.topics().len(), 3);
    }

    #[test]
    fn test_unseeded_context_starts_empty() {
        let mut config = AppConfig::default();
        config.seed.enabled = false;
        let context = AppContext::new(config).unwrap();

        assert!(context.targets.list().is_empty());
        let current = context.feed.current(&[Topic::from("targets")]);
        assert_eq!(current[0].version, 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = AppConfig::default();
        config.workflows.runner = RunnerKind::Webhook;
        assert!(AppContext::new(config).is_err());
    }
}

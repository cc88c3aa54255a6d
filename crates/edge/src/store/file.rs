// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! File-backed rule repository: re-reads the rules JSON on every registry
//! refresh, so rule edits land within one refresh interval.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::config::load_rules;
use crate::error::StoreError;
use crate::model::AlarmRule;
use crate::store::AlarmRuleRepository;

pub struct FileRuleStore {
    path: PathBuf,
}

impl FileRuleStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl AlarmRuleRepository for FileRuleStore {
    async fn list_enabled(&self) -> Result<Vec<AlarmRule>, StoreError> {
        let rules = load_rules(&self.path)
            .map_err(|e| StoreError::Unavailable(format!("{e:#}")))?;
        Ok(rules.into_iter().filter(|r| r.enabled).collect())
    }
}

//! Cascading option resolution
//!
//! A [`Cascade`] is a chain of dependent selections (group → catalogue →
//! case type → document type). Each level's options are loaded for the
//! values committed above it. Every fetch is tagged with a per-level
//! generation; a result whose generation is no longer current is dropped,
//! so a slow answer for an old parent value can never overwrite a newer one.
//!
//! Fetches are split into [`Cascade::select`]/[`Cascade::begin_fetch`]
//! (which hand out a [`FetchTicket`]) and [`Cascade::resolve`], so the
//! loading itself never holds a borrow of the cascade.

use crate::error::{EngineError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One selectable option
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub value: String,
    pub label: String,
}

impl OptionRecord {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
        }
    }
}

/// How a level orders loaded options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptionOrdering {
    /// Keep the order the source returned
    #[default]
    Natural,
    /// Sort lexicographically by label
    ByLabel,
}

/// Static description of a level
#[derive(Debug, Clone)]
pub struct LevelSpec {
    pub name: String,
    pub ordering: OptionOrdering,
    /// Pick the first option when the current value is not among the loaded ones
    pub auto_select: bool,
}

impl LevelSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ordering: OptionOrdering::Natural,
            auto_select: false,
        }
    }

    pub fn ordered(mut self, ordering: OptionOrdering) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn auto_select(mut self) -> Self {
        self.auto_select = true;
        self
    }
}

/// Load state of a level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LevelStatus {
    /// Nothing loaded; a parent may still be unset
    Idle,
    Loading,
    Ready,
    /// Last load failed; `begin_fetch` retries
    Failed,
}

#[derive(Debug, Clone)]
struct Level {
    spec: LevelSpec,
    generation: u64,
    status: LevelStatus,
    options: Vec<OptionRecord>,
    selected: Option<String>,
}

/// Permission to apply one fetch result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub level: usize,
    generation: u64,
    /// Committed values of every ancestor level, root first
    pub parents: Vec<String>,
}

/// What happened when a fetch result came back
#[derive(Debug)]
pub enum Resolution {
    /// Superseded by a newer fetch; nothing changed
    Discarded,
    /// Options applied
    Loaded {
        /// Value chosen by auto-select, to be persisted by the caller
        auto_selected: Option<String>,
        /// The previous selection was not among the options and was dropped
        cleared: bool,
        /// Fetch for the next level, when the selection changed
        follow_up: Option<FetchTicket>,
    },
    /// Load failed; the level is marked failed
    Failed(EngineError),
}

/// Loads options for a level given its ancestors' values
#[async_trait]
pub trait OptionSource: Send + Sync {
    async fn load(&self, level: usize, parents: &[String]) -> Result<Vec<OptionRecord>>;
}

/// Chain of dependent selections
#[derive(Debug, Clone)]
pub struct Cascade {
    levels: Vec<Level>,
}

impl Cascade {
    pub fn new(specs: Vec<LevelSpec>) -> Self {
        Self {
            levels: specs
                .into_iter()
                .map(|spec| Level {
                    spec,
                    generation: 0,
                    status: LevelStatus::Idle,
                    options: Vec::new(),
                    selected: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn selected(&self, level: usize) -> Option<&str> {
        self.levels.get(level)?.selected.as_deref()
    }

    pub fn options(&self, level: usize) -> &[OptionRecord] {
        self.levels.get(level).map_or(&[], |l| l.options.as_slice())
    }

    pub fn status(&self, level: usize) -> Option<LevelStatus> {
        self.levels.get(level).map(|l| l.status)
    }

    /// Seed selections (e.g. from saved configuration) without fetching
    pub fn restore(&mut self, values: &[Option<String>]) {
        for (level, value) in self.levels.iter_mut().zip(values) {
            level.selected = value.clone();
        }
    }

    /// Commit a value at `level`.
    ///
    /// Every descendant is reset and its in-flight fetches invalidated. When
    /// a value is set and a child level exists, the child's fetch ticket is
    /// returned. Re-selecting the current value changes nothing.
    pub fn select(&mut self, level: usize, value: Option<String>) -> Option<FetchTicket> {
        let current = self.levels.get_mut(level)?;
        if current.selected == value {
            return None;
        }
        debug!(level = %current.spec.name, value = ?value, "selection changed");
        current.selected = value;
        self.invalidate_below(level);
        self.begin_fetch(level + 1)
    }

    /// Start a fetch for `level`, superseding any fetch in flight for it.
    ///
    /// Returns `None` if the level does not exist or an ancestor is unset.
    pub fn begin_fetch(&mut self, level: usize) -> Option<FetchTicket> {
        if level >= self.levels.len() {
            return None;
        }
        let parents: Vec<String> = self.levels[..level]
            .iter()
            .map(|l| l.selected.clone())
            .collect::<Option<Vec<_>>>()?;

        let target = &mut self.levels[level];
        target.generation += 1;
        target.status = LevelStatus::Loading;
        Some(FetchTicket {
            level,
            generation: target.generation,
            parents,
        })
    }

    /// Apply a fetch result if its ticket is still current
    pub fn resolve(&mut self, ticket: FetchTicket, result: Result<Vec<OptionRecord>>) -> Resolution {
        let Some(target) = self.levels.get_mut(ticket.level) else {
            return Resolution::Discarded;
        };
        if target.generation != ticket.generation {
            warn!(
                level = %target.spec.name,
                stale = ticket.generation,
                current = target.generation,
                "discarding stale option result"
            );
            return Resolution::Discarded;
        }

        let mut options = match result {
            Ok(options) => options,
            Err(e) => {
                target.status = LevelStatus::Failed;
                target.options.clear();
                return Resolution::Failed(e);
            }
        };
        if target.spec.ordering == OptionOrdering::ByLabel {
            options.sort_by(|a, b| a.label.cmp(&b.label));
        }
        target.options = options;
        target.status = LevelStatus::Ready;

        let valid = target
            .selected
            .as_ref()
            .map_or(false, |v| target.options.iter().any(|o| &o.value == v));
        if valid || (target.selected.is_none() && !target.spec.auto_select) {
            return Resolution::Loaded {
                auto_selected: None,
                cleared: false,
                follow_up: None,
            };
        }

        let cleared = target.selected.is_some();
        let auto_selected = match target.options.first() {
            Some(first) if target.spec.auto_select => Some(first.value.clone()),
            _ => None,
        };
        if let Some(ref value) = auto_selected {
            info!(level = %target.spec.name, value = %value, "auto-selected option");
        }
        target.selected = auto_selected.clone();

        let level = ticket.level;
        self.invalidate_below(level);
        let follow_up = if auto_selected.is_some() {
            self.begin_fetch(level + 1)
        } else {
            None
        };
        Resolution::Loaded {
            auto_selected,
            cleared,
            follow_up,
        }
    }

    /// Select a value and load the dependent levels to completion.
    ///
    /// Convenience for sequential callers; concurrent callers use the
    /// ticket API directly.
    pub async fn change<S: OptionSource + ?Sized>(
        &mut self,
        source: &S,
        level: usize,
        value: Option<String>,
    ) -> Result<Vec<String>> {
        let ticket = self.select(level, value);
        self.drive(source, ticket).await
    }

    /// Load `level` (and whatever auto-selection pulls in below it)
    pub async fn load<S: OptionSource + ?Sized>(&mut self, source: &S, level: usize) -> Result<Vec<String>> {
        let ticket = self.begin_fetch(level);
        self.drive(source, ticket).await
    }

    /// Returns the auto-selected values, top-most first
    async fn drive<S: OptionSource + ?Sized>(
        &mut self,
        source: &S,
        mut ticket: Option<FetchTicket>,
    ) -> Result<Vec<String>> {
        let mut auto_selected = Vec::new();
        while let Some(current) = ticket.take() {
            let result = source.load(current.level, &current.parents).await;
            match self.resolve(current, result) {
                Resolution::Loaded { auto_selected: picked, follow_up, .. } => {
                    auto_selected.extend(picked);
                    ticket = follow_up;
                }
                Resolution::Discarded => {}
                Resolution::Failed(e) => return Err(e),
            }
        }
        Ok(auto_selected)
    }

    fn invalidate_below(&mut self, level: usize) {
        for child in self.levels.iter_mut().skip(level + 1) {
            child.generation += 1;
            child.status = LevelStatus::Idle;
            child.options.clear();
            child.selected = None;
        }
    }
}

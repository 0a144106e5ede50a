//! Lazily-populated cache of engine instances keyed by model id.
//!
//! Loading a network is expensive and the set of models is small and fixed
//! by the difficulty table, so instances are created on first use and kept
//! for the life of the process. Only model-level options (weights,
//! temperature, cache size) are applied at creation; per-search limits and
//! the position are supplied with every request.
//!
//! The registry has no lock of its own. It is meant to live inside a
//! [`RequestGate`](crate::gate::RequestGate), and `get_or_create` takes
//! `&mut self`, so callers can only reach it through the gate's
//! [`ExclusiveAccess`](crate::gate::ExclusiveAccess) token.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::config::EngineSettings;
use crate::consts::{OPTION_NN_CACHE_SIZE, OPTION_TEMPERATURE, OPTION_WEIGHTS_FILE};
use crate::difficulty::DifficultyProfile;
use crate::engine::{CompletionSink, Engine, EngineFactory};

/// One configured engine and the options it was created with.
pub struct EngineEntry {
    model_id: String,
    options: Vec<(String, String)>,
    engine: Box<dyn Engine>,
}

impl EngineEntry {
    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Options applied at creation, in order.
    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    pub fn engine(&mut self) -> &mut dyn Engine {
        self.engine.as_mut()
    }
}

/// Engines by model id, created on first use and kept for the process lifetime.
pub struct EngineRegistry {
    factory: Arc<dyn EngineFactory>,
    sink: CompletionSink,
    weights_dir: Option<PathBuf>,
    cache_size: u32,
    entries: HashMap<String, EngineEntry>,
}

impl EngineRegistry {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        sink: CompletionSink,
        settings: &EngineSettings,
    ) -> Self {
        Self {
            factory,
            sink,
            weights_dir: settings.weights_dir.clone(),
            cache_size: settings.cache_size,
            entries: HashMap::new(),
        }
    }

    /// Return the engine for `profile.model_id`, creating and configuring it
    /// on first use. A failed creation leaves nothing cached, so the next
    /// request retries.
    pub async fn get_or_create(&mut self, profile: &DifficultyProfile) -> Result<&mut EngineEntry> {
        match self.entries.entry(profile.model_id.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let model = &profile.model_id;
                let options = vec![
                    (OPTION_WEIGHTS_FILE.to_string(), weights_file(&self.weights_dir, model)),
                    (OPTION_TEMPERATURE.to_string(), profile.temperature.to_string()),
                    (OPTION_NN_CACHE_SIZE.to_string(), self.cache_size.to_string()),
                ];

                let mut engine = self
                    .factory
                    .create(&profile.model_id, self.sink.clone())
                    .await
                    .with_context(|| format!("failed to start engine for model {model}"))?;
                for (name, value) in &options {
                    engine
                        .set_option(name, value)
                        .await
                        .with_context(|| format!("failed to set {name} for model {model}"))?;
                }

                info!(model = %profile.model_id, "engine created");
                Ok(slot.insert(EngineEntry {
                    model_id: profile.model_id.clone(),
                    options,
                    engine,
                }))
            }
        }
    }

    pub fn contains(&self, model_id: &str) -> bool {
        self.entries.contains_key(model_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loaded model ids, sorted.
    pub fn model_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.entries.keys().cloned().collect();
        ids.sort();
        ids
    }
}

fn weights_file(dir: &Option<PathBuf>, model_id: &str) -> String {
    match dir {
        Some(dir) => dir.join(model_id).display().to_string(),
        None => model_id.to_string(),
    }
}

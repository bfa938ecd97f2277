//! Keyword-scoring router.
//!
//! Selection is deterministic: candidates are the usable servers in
//! registry order, scored by distinct keyword overlap between the task
//! hint and the server's description plus tool metadata. A strictly
//! higher score wins; ties go to the earlier registration. The router
//! never invents capability: a requested tool narrows the candidate set
//! to its advertisers before any scoring happens.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use conductor_core::{InvokeResult, RouteError, RouteResult};

use crate::connection::{ConnectionManager, ConnectionRecord};
use crate::registry::ServerRegistry;

/// Selects a server (and tool) for each task step.
pub struct Router {
    registry: Arc<ServerRegistry>,
    connections: Arc<ConnectionManager>,
}

struct Candidate {
    record: ConnectionRecord,
    description: String,
}

impl Router {
    /// Create a router over a registry and connection manager.
    pub fn new(registry: Arc<ServerRegistry>, connections: Arc<ConnectionManager>) -> Self {
        Self {
            registry,
            connections,
        }
    }

    /// The connection manager this router selects from.
    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Select a `(server_id, tool_name)` pair for a task step.
    ///
    /// `requested_tool` narrows candidates to servers advertising that
    /// exact tool. `preferred` short-circuits scoring when the named
    /// server is usable and can serve the request. Distinguishes "nothing
    /// is up" ([`RouteError::NoConnectedServers`]) from "nothing fits"
    /// ([`RouteError::NoRoute`]).
    pub fn select(
        &self,
        task_hint: &str,
        requested_tool: Option<&str>,
        preferred: Option<&str>,
    ) -> RouteResult<(String, String)> {
        let candidates = self.usable_candidates();
        if candidates.is_empty() {
            return Err(RouteError::NoConnectedServers);
        }

        if let Some(preferred_id) = preferred
            && let Some(candidate) = candidates.iter().find(|c| c.record.server_id == preferred_id)
        {
            let tool = match requested_tool {
                Some(tool) if candidate.advertises(tool) => Some(tool.to_string()),
                Some(_) => None,
                None => candidate.best_tool(task_hint),
            };
            if let Some(tool) = tool {
                debug!(server_id = %preferred_id, tool = %tool, "Routed to preferred server");
                return Ok((preferred_id.to_string(), tool));
            }
        }

        if let Some(tool) = requested_tool {
            let advertisers: Vec<&Candidate> =
                candidates.iter().filter(|c| c.advertises(tool)).collect();
            if advertisers.is_empty() {
                return Err(RouteError::NoRoute(format!(
                    "no connected server advertises tool {tool}"
                )));
            }
            let hint_words = keywords(task_hint);
            // max_by_key keeps the last max; iterate in reverse so the
            // earliest registration wins ties.
            let best = advertisers
                .iter()
                .rev()
                .max_by_key(|c| c.score(&hint_words))
                .expect("non-empty advertisers");
            debug!(server_id = %best.record.server_id, tool = %tool, "Routed by requested tool");
            return Ok((best.record.server_id.clone(), tool.to_string()));
        }

        // Without a requested tool the hint is matched against server
        // descriptions only; tool metadata narrows the pick afterwards.
        let hint_words = keywords(task_hint);
        let scored: Vec<(usize, &Candidate)> = candidates
            .iter()
            .map(|c| (c.description_score(&hint_words), c))
            .collect();
        if scored.iter().all(|(score, _)| *score == 0) {
            return Err(RouteError::NoRoute(format!(
                "no server description matches hint {task_hint:?}"
            )));
        }

        let (score, best) = scored
            .iter()
            .rev()
            .max_by_key(|(score, _)| *score)
            .expect("non-empty candidates");
        let tool = best
            .best_tool(task_hint)
            .ok_or_else(|| RouteError::NoRoute(format!(
                "selected server {} advertises no tools",
                best.record.server_id
            )))?;
        debug!(
            server_id = %best.record.server_id,
            tool = %tool,
            score,
            "Routed by keyword score"
        );
        Ok((best.record.server_id.clone(), tool))
    }

    /// Route and invoke in one call.
    pub async fn invoke_auto(
        &self,
        task_hint: &str,
        requested_tool: Option<&str>,
        args: Value,
    ) -> InvokeResult<Value> {
        let (server_id, tool) = self.select(task_hint, requested_tool, None)?;
        self.connections.invoke(&server_id, &tool, args).await
    }

    fn usable_candidates(&self) -> Vec<Candidate> {
        self.registry
            .list()
            .into_iter()
            .filter_map(|config| {
                let record = self.connections.record(&config.id)?;
                record.status.is_usable().then_some(Candidate {
                    record,
                    description: config.description,
                })
            })
            .collect()
    }
}

impl Candidate {
    fn advertises(&self, tool: &str) -> bool {
        self.record.advertised_tools.iter().any(|t| t.name == tool)
    }

    /// Distinct hint keywords found in the description alone.
    fn description_score(&self, hint_words: &HashSet<String>) -> usize {
        let haystack = self.description.to_lowercase();
        let haystack_words: HashSet<&str> = haystack.split_whitespace().collect();
        hint_words
            .iter()
            .filter(|word| haystack_words.contains(word.as_str()))
            .count()
    }

    /// Distinct hint keywords found in the description or tool metadata.
    fn score(&self, hint_words: &HashSet<String>) -> usize {
        let mut haystack = self.description.to_lowercase();
        for tool in &self.record.advertised_tools {
            haystack.push(' ');
            haystack.push_str(&tool.name.to_lowercase());
            haystack.push(' ');
            haystack.push_str(&tool.description.to_lowercase());
        }
        let haystack_words: HashSet<&str> = haystack.split_whitespace().collect();
        hint_words
            .iter()
            .filter(|word| haystack_words.contains(word.as_str()))
            .count()
    }

    /// Advertised tool with the best hint overlap, falling back to the
    /// first advertised tool.
    fn best_tool(&self, task_hint: &str) -> Option<String> {
        let hint_words = keywords(task_hint);
        let best = self
            .record
            .advertised_tools
            .iter()
            .rev()
            .max_by_key(|tool| {
                let text = format!(
                    "{} {}",
                    tool.name.to_lowercase(),
                    tool.description.to_lowercase()
                );
                let words: HashSet<&str> = text.split_whitespace().collect();
                hint_words
                    .iter()
                    .filter(|w| words.contains(w.as_str()))
                    .count()
            });
        best.map(|tool| tool.name.clone())
    }
}

fn keywords(hint: &str) -> HashSet<String> {
    hint.to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

//! Session registry: the authoritative in-memory model of live sessions.
//!
//! Every mutation goes through one `RwLock` on [`Inner`], so event folding,
//! timer sweeps and out-of-band registrations are serialized. Readers get
//! cloned [`AgentRecord`]s, never references into the map.
//!
//! Lifecycle summary:
//! - `session started` for an unknown id creates a record (`entering`) and
//!   reserves the first free desk.
//! - Any other event for an unknown id is ignored, unless the id was
//!   registered before and evicted since; then the record is re-created.
//! - `session ended` moves to `leaving`, frees the desk at once and removes
//!   the record after the grace delay. A new `started` during the grace
//!   delay cancels the removal; any other event for a departing record is
//!   ignored.
//! - The stale sweep marks quiet sessions `idle` and evicts long-quiet ones.
//!   An evicted session's registration is kept for one more eviction period.
//! - The waiting detector raises `waitingForHuman` once a waiting signal
//!   has gone unanswered for the threshold.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use agent_office_core::tools::clip;
use agent_office_core::{
    classify_tool, ActivityKind, AgentKind, DomainEvent, SessionKind, Severity, ToolKind,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use ts_rs::TS;

use super::desks::DeskPool;
use super::record::{short_name, AgentRecord, AgentSource, AgentState};

const MAX_ACTIVITY_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub idle_after: Duration,
    pub evict_after: Duration,
    pub waiting_after: Duration,
    pub leave_grace: Duration,
    pub desk_count: usize,
    pub top_tools: usize,
    /// Identifier of the local machine, always listed in snapshots.
    pub machine_id: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            idle_after: Duration::from_secs(300),
            evict_after: Duration::from_secs(900),
            waiting_after: Duration::from_secs(60),
            leave_grace: Duration::from_secs(2),
            desk_count: 8,
            top_tools: 5,
            machine_id: "local".to_string(),
        }
    }
}

/// Change notifications for the broadcast hub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryUpdate {
    Changed(String),
    Removed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// A new record was created.
    Created,
    /// An evicted session was re-created from its registration.
    Recreated,
    /// A departing session was brought back before removal.
    Revived,
    Applied,
    /// No record and no registration: dropped.
    Ignored,
}

/// What the registry remembers about a session beyond its record, so an
/// evicted session can be re-created.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub session_id: String,
    pub source: AgentSource,
    pub parent_id: Option<String>,
    pub project: Option<String>,
    pub name: Option<String>,
    pub source_type: Option<String>,
    pub machine: Option<String>,
    pub url: Option<String>,
    /// Already counted in usage statistics.
    counted: bool,
    /// Set while the session is evicted; cleared on re-creation.
    evicted_at: Option<DateTime<Utc>>,
}

impl Registration {
    pub fn new(session_id: impl Into<String>, source: AgentSource) -> Self {
        Self {
            session_id: session_id.into(),
            source,
            parent_id: None,
            project: None,
            name: None,
            source_type: None,
            machine: None,
            url: None,
            counted: false,
            evicted_at: None,
        }
    }

    /// Overlay the fields `other` sets.
    fn merge(&mut self, other: &Registration) {
        self.source = other.source;
        for (mine, theirs) in [
            (&mut self.parent_id, &other.parent_id),
            (&mut self.project, &other.project),
            (&mut self.name, &other.name),
            (&mut self.source_type, &other.source_type),
            (&mut self.machine, &other.machine),
            (&mut self.url, &other.url),
        ] {
            if theirs.is_some() {
                mine.clone_from(theirs);
            }
        }
    }

    fn apply_to(&self, record: &mut AgentRecord) {
        record.source = self.source;
        if let Some(name) = &self.name {
            record.name.clone_from(name);
        }
        if self.project.is_some() {
            record.project.clone_from(&self.project);
        }
        if self.parent_id.is_some() {
            record.parent_id.clone_from(&self.parent_id);
        }
        if self.source_type.is_some() {
            record.source_type.clone_from(&self.source_type);
        }
        if self.machine.is_some() {
            record.machine.clone_from(&self.machine);
        }
        if self.url.is_some() {
            record.url.clone_from(&self.url);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct ToolCount {
    pub tool: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub sessions_today: u64,
    pub total_sessions: u64,
    pub total_hours: f64,
    pub top_tools: Vec<ToolCount>,
}

/// Full, consistent view of the registry.
#[derive(Debug, Clone, Serialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../web/src/types/generated/"))]
pub struct Snapshot {
    pub agents: Vec<AgentRecord>,
    pub stats: UsageStats,
    pub machines: Vec<String>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub idled: Vec<String>,
    pub evicted: Vec<String>,
}

#[derive(Debug)]
struct StatsTracker {
    day: NaiveDate,
    today: u64,
    total: u64,
    closed_secs: f64,
    tools: HashMap<String, u64>,
}

impl StatsTracker {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            day: now.date_naive(),
            today: 0,
            total: 0,
            closed_secs: 0.0,
            tools: HashMap::new(),
        }
    }

    fn session_created(&mut self, at: DateTime<Utc>) {
        let day = at.date_naive();
        if day != self.day {
            self.day = day;
            self.today = 0;
        }
        self.today += 1;
        self.total += 1;
    }

    fn session_closed(&mut self, created: DateTime<Utc>, at: DateTime<Utc>) {
        self.closed_secs += (at - created).num_milliseconds().max(0) as f64 / 1000.0;
    }

    fn tool_started(&mut self, tool: &str) {
        *self.tools.entry(tool.to_string()).or_insert(0) += 1;
    }

    fn summary<'a>(
        &self,
        live: impl Iterator<Item = &'a AgentRecord>,
        now: DateTime<Utc>,
        top_n: usize,
    ) -> UsageStats {
        let live_secs: f64 = live
            .map(|r| (now - r.created_at).num_milliseconds().max(0) as f64 / 1000.0)
            .sum();

        let mut top: Vec<ToolCount> = self
            .tools
            .iter()
            .map(|(tool, count)| ToolCount {
                tool: tool.clone(),
                count: *count,
            })
            .collect();
        top.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tool.cmp(&b.tool)));
        top.truncate(top_n);

        UsageStats {
            sessions_today: if now.date_naive() == self.day { self.today } else { 0 },
            total_sessions: self.total,
            total_hours: (self.closed_secs + live_secs) / 3600.0,
            top_tools: top,
        }
    }
}

struct Inner {
    sessions: HashMap<String, AgentRecord>,
    registrations: HashMap<String, Registration>,
    desks: DeskPool,
    pending_removals: HashMap<String, JoinHandle<()>>,
    stats: StatsTracker,
    machines: BTreeSet<String>,
}

pub struct SessionRegistry {
    inner: RwLock<Inner>,
    updates: broadcast::Sender<RegistryUpdate>,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let (updates, _) = broadcast::channel(256);
        let mut machines = BTreeSet::new();
        machines.insert(config.machine_id.clone());
        Self {
            inner: RwLock::new(Inner {
                sessions: HashMap::new(),
                registrations: HashMap::new(),
                desks: DeskPool::new(config.desk_count),
                pending_removals: HashMap::new(),
                stats: StatsTracker::new(Utc::now()),
                machines,
            }),
            updates,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryUpdate> {
        self.updates.subscribe()
    }

    fn notify(&self, update: RegistryUpdate) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.updates.send(update);
    }

    /// Fold one domain event into the model.
    pub async fn apply(self: &Arc<Self>, event: &DomainEvent) -> ApplyOutcome {
        let id = event.session_id();
        let at = event.timestamp();
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let outcome = match event {
            DomainEvent::Session {
                kind: SessionKind::Started,
                parent_session_id,
                project,
                ..
            } => {
                let mut reg = Registration::new(id, AgentSource::File);
                reg.parent_id.clone_from(parent_session_id);
                reg.project.clone_from(project);
                let reg = merge_registration(inner, reg);
                self.ensure_live(inner, &reg, at)
            }
            _ => match inner.sessions.get(id) {
                Some(record) if record.is_departing() => {
                    tracing::trace!(session_id = %id, event = event.label(), "Event for departing session ignored");
                    ApplyOutcome::Ignored
                }
                Some(_) => ApplyOutcome::Applied,
                None => self.recreate_or_ignore(inner, event, at),
            },
        };
        if outcome == ApplyOutcome::Ignored {
            return outcome;
        }

        if matches!(event, DomainEvent::Session { kind: SessionKind::Ended, .. }) {
            self.begin_leave(inner, id, at);
        } else if let Some(record) = inner.sessions.get_mut(id) {
            fold_event(record, event, &mut inner.stats);
        }
        self.notify(RegistryUpdate::Changed(id.to_string()));
        outcome
    }

    fn recreate_or_ignore(&self, inner: &mut Inner, event: &DomainEvent, at: DateTime<Utc>) -> ApplyOutcome {
        let id = event.session_id();
        match inner.registrations.get(id).cloned() {
            Some(reg) => {
                tracing::debug!(session_id = %id, "Re-creating evicted session");
                self.create(inner, &reg, at);
                ApplyOutcome::Recreated
            }
            None => {
                tracing::trace!(session_id = %id, event = event.label(), "Event for unknown session ignored");
                ApplyOutcome::Ignored
            }
        }
    }

    /// Out-of-band creation (push `start`). Creates or refreshes the record.
    pub async fn register(self: &Arc<Self>, registration: Registration, at: DateTime<Utc>) -> ApplyOutcome {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let id = registration.session_id.clone();
        let reg = merge_registration(inner, registration);
        let outcome = self.ensure_live(inner, &reg, at);
        if let Some(machine) = &reg.machine {
            inner.machines.insert(machine.clone());
        }
        if let Some(record) = inner.sessions.get_mut(&id) {
            reg.apply_to(record);
            record.touch(at, false);
        }
        self.notify(RegistryUpdate::Changed(id));
        outcome
    }

    /// Refresh the last-event time without counting as an event.
    pub async fn touch(&self, session_id: &str, at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write().await;
        match inner.sessions.get_mut(session_id) {
            Some(record) => {
                record.last_event_at = record.last_event_at.max(at);
                true
            }
            None => false,
        }
    }

    /// Set `waitingForHuman` immediately (explicit stop signal).
    pub async fn mark_waiting_now(&self, session_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.sessions.get_mut(session_id) else {
            return false;
        };
        if record.is_departing() {
            return true;
        }
        if !record.waiting_for_human {
            record.waiting_for_human = true;
            self.notify(RegistryUpdate::Changed(session_id.to_string()));
        }
        true
    }

    /// Apply a state reported by a push producer.
    pub async fn set_reported_state(
        &self,
        session_id: &str,
        state: AgentState,
        activity: Option<&str>,
        at: DateTime<Utc>,
    ) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.sessions.get_mut(session_id) else {
            return false;
        };
        if record.is_departing() {
            return true;
        }
        record.touch(at, state == AgentState::Waiting);
        record.transition(state, at);
        if let Some(text) = activity {
            record.activity = clip(text, MAX_ACTIVITY_CHARS);
        }
        self.notify(RegistryUpdate::Changed(session_id.to_string()));
        true
    }

    pub async fn contains(&self, session_id: &str) -> bool {
        self.inner.read().await.sessions.contains_key(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Option<AgentRecord> {
        self.inner.read().await.sessions.get(session_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot_at(Utc::now()).await
    }

    pub async fn snapshot_at(&self, now: DateTime<Utc>) -> Snapshot {
        let inner = self.inner.read().await;
        let mut agents: Vec<AgentRecord> = inner.sessions.values().cloned().collect();
        agents.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Snapshot {
            stats: inner
                .stats
                .summary(inner.sessions.values(), now, self.config.top_tools),
            agents,
            machines: inner.machines.iter().cloned().collect(),
        }
    }

    /// Mark quiet sessions idle and evict long-quiet ones.
    pub async fn sweep_stale(&self, now: DateTime<Utc>) -> SweepReport {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        let mut report = SweepReport::default();

        for record in inner.sessions.values_mut() {
            if record.is_departing() {
                continue;
            }
            let age = (now - record.last_event_at).to_std().unwrap_or_default();
            if age >= self.config.evict_after {
                report.evicted.push(record.id.clone());
            } else if age >= self.config.idle_after && record.state != AgentState::Idle {
                record.transition(AgentState::Idle, now);
                record.activity = "Idle".to_string();
                report.idled.push(record.id.clone());
            }
        }

        for id in &report.idled {
            self.notify(RegistryUpdate::Changed(id.clone()));
        }
        for id in &report.evicted {
            tracing::info!(session_id = %id, "Evicting stale session");
            if let Some(record) = inner.sessions.get_mut(id) {
                record.transition(AgentState::Leaving, now);
            }
            self.remove_record(inner, id, now);
            if let Some(reg) = inner.registrations.get_mut(id) {
                reg.evicted_at = Some(now);
            }
        }

        // Evicted sessions stay re-creatable for one more eviction period.
        let keep_for = self.config.evict_after;
        inner.registrations.retain(|_, reg| match reg.evicted_at {
            Some(evicted) => (now - evicted).to_std().unwrap_or_default() < keep_for,
            None => true,
        });
        report
    }

    /// Raise `waitingForHuman` for sessions whose last event was a waiting
    /// signal older than the threshold. Returns the ids newly flagged.
    pub async fn detect_waiting(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut inner = self.inner.write().await;
        let mut flagged = Vec::new();
        for record in inner.sessions.values_mut() {
            if !record.last_event_waiting || record.waiting_for_human || record.is_departing() {
                continue;
            }
            let age = (now - record.last_event_at).to_std().unwrap_or_default();
            if age >= self.config.waiting_after {
                record.waiting_for_human = true;
                flagged.push(record.id.clone());
            }
        }
        for id in &flagged {
            self.notify(RegistryUpdate::Changed(id.clone()));
        }
        flagged
    }

    /// Run the stale sweep and waiting detector until `cancel` fires.
    pub fn spawn_timers(
        self: &Arc<Self>,
        sweep_every: Duration,
        waiting_every: Duration,
        cancel: CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        let sweeper = {
            let registry = Arc::clone(self);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(sweep_every);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            let report = registry.sweep_stale(Utc::now()).await;
                            if !report.evicted.is_empty() || !report.idled.is_empty() {
                                tracing::debug!(idled = report.idled.len(), evicted = report.evicted.len(), "Stale sweep");
                            }
                        }
                    }
                }
            })
        };
        let detector = {
            let registry = Arc::clone(self);
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(waiting_every);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = interval.tick() => {
                            for id in registry.detect_waiting(Utc::now()).await {
                                tracing::info!(session_id = %id, "Session waiting for human");
                            }
                        }
                    }
                }
            })
        };
        vec![sweeper, detector]
    }

    /// Record a machine identifier reported by a push producer.
    pub async fn add_machine(&self, machine: &str) {
        self.inner.write().await.machines.insert(machine.to_string());
    }

    /// Cancel pending removals and drop every record.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.write().await;
        for (_, handle) in inner.pending_removals.drain() {
            handle.abort();
        }
        inner.sessions.clear();
        inner.desks.clear();
        crate::metrics::set_live_sessions(0);
    }

    fn ensure_live(self: &Arc<Self>, inner: &mut Inner, reg: &Registration, at: DateTime<Utc>) -> ApplyOutcome {
        let id = reg.session_id.as_str();
        let Some(record) = inner.sessions.get_mut(id) else {
            self.create(inner, reg, at);
            return ApplyOutcome::Created;
        };
        if !record.is_departing() {
            return ApplyOutcome::Applied;
        }

        if let Some(handle) = inner.pending_removals.remove(id) {
            handle.abort();
        }
        record.desk = inner.desks.reserve(id);
        record.transition(AgentState::Entering, at);
        record.activity = "Arriving".to_string();
        tracing::debug!(session_id = %id, "Session revived during leave grace");
        ApplyOutcome::Revived
    }

    fn create(&self, inner: &mut Inner, reg: &Registration, at: DateTime<Utc>) {
        let id = reg.session_id.as_str();
        let desk = inner.desks.reserve(id);
        let mut record = AgentRecord::new(id, reg.source, desk, at);
        record.name = reg.name.clone().unwrap_or_else(|| short_name(id));
        reg.apply_to(&mut record);

        if let Some(parent_id) = &record.parent_id {
            if let Some(parent) = inner.sessions.get_mut(parent_id) {
                if !parent.child_ids.iter().any(|c| c == id) {
                    parent.child_ids.push(id.to_string());
                }
            }
        }
        record.child_ids = inner
            .sessions
            .values()
            .filter(|r| r.parent_id.as_deref() == Some(id))
            .map(|r| r.id.clone())
            .collect();
        record.child_ids.sort();

        if let Some(machine) = &reg.machine {
            inner.machines.insert(machine.clone());
        }
        let first_time = match inner.registrations.get_mut(id) {
            Some(stored) => {
                stored.evicted_at = None;
                !std::mem::replace(&mut stored.counted, true)
            }
            None => true,
        };
        if first_time {
            inner.stats.session_created(at);
        }
        inner.sessions.insert(id.to_string(), record);
        crate::metrics::set_live_sessions(inner.sessions.len());
        tracing::info!(session_id = %id, desk = ?desk, parent = ?reg.parent_id, "Session registered");
    }

    fn begin_leave(self: &Arc<Self>, inner: &mut Inner, id: &str, at: DateTime<Utc>) {
        let Some(record) = inner.sessions.get_mut(id) else {
            return;
        };
        record.touch(at, false);
        inner.desks.release(id);
        record.desk = None;
        record.transition(AgentState::Leaving, at);
        record.activity = "Leaving".to_string();
        inner.registrations.remove(id);

        let registry = Arc::clone(self);
        let grace = self.config.leave_grace;
        let session_id = id.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            registry.finish_removal(&session_id).await;
        });
        if let Some(previous) = inner.pending_removals.insert(id.to_string(), handle) {
            previous.abort();
        }
    }

    async fn finish_removal(&self, session_id: &str) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;
        inner.pending_removals.remove(session_id);
        if inner.sessions.get(session_id).is_some_and(AgentRecord::is_departing) {
            self.remove_record(inner, session_id, Utc::now());
        }
    }

    fn remove_record(&self, inner: &mut Inner, id: &str, at: DateTime<Utc>) {
        let Some(record) = inner.sessions.remove(id) else {
            return;
        };
        inner.desks.release(id);
        if let Some(parent_id) = &record.parent_id {
            if let Some(parent) = inner.sessions.get_mut(parent_id) {
                parent.child_ids.retain(|c| c != id);
            }
        }
        for child_id in &record.child_ids {
            if let Some(child) = inner.sessions.get_mut(child_id) {
                child.parent_id = None;
            }
        }
        inner.stats.session_closed(record.created_at, at);
        crate::metrics::set_live_sessions(inner.sessions.len());
        self.notify(RegistryUpdate::Removed(id.to_string()));
    }
}

fn merge_registration(inner: &mut Inner, reg: Registration) -> Registration {
    let entry = inner
        .registrations
        .entry(reg.session_id.clone())
        .or_insert_with(|| Registration::new(reg.session_id.clone(), reg.source));
    entry.merge(&reg);
    entry.clone()
}

/// State transition for one event on an existing record.
fn fold_event(record: &mut AgentRecord, event: &DomainEvent, stats: &mut StatsTracker) {
    let at = event.timestamp();
    record.touch(at, event.is_waiting_signal());

    match event {
        DomainEvent::Session { .. } => {}
        DomainEvent::Activity { kind, detail, .. } => {
            let (state, text) = match kind {
                ActivityKind::Thinking => (AgentState::Thinking, "Thinking"),
                ActivityKind::Responding => (AgentState::Coding, "Responding"),
                ActivityKind::Waiting => (AgentState::Waiting, "Waiting for input"),
                ActivityKind::UserPrompt => (AgentState::Thinking, "Reading the prompt"),
                ActivityKind::NeedsApproval => (AgentState::Waiting, "Needs approval"),
                ActivityKind::Compacting => (AgentState::Cooling, "Compacting context"),
            };
            record.transition(state, at);
            record.activity = match detail {
                Some(d) => clip(d, MAX_ACTIVITY_CHARS),
                None => text.to_string(),
            };
        }
        DomainEvent::Tool { kind: ToolKind::Started, tool, context, .. } => {
            let category = classify_tool(tool);
            record.transition(AgentState::from_tool(category), at);
            record.activity = clip(&category.activity_text(context.as_deref()), MAX_ACTIVITY_CHARS);
            stats.tool_started(tool);
        }
        DomainEvent::Tool { kind: ToolKind::Completed, .. } => {}
        DomainEvent::Tool { kind: ToolKind::Error, tool, .. } => {
            record.transition(AgentState::Error, at);
            record.activity = clip(&format!("{tool} failed"), MAX_ACTIVITY_CHARS);
        }
        DomainEvent::Agent { kind: AgentKind::Spawned, name, .. } => {
            record.transition(AgentState::Delegating, at);
            record.activity = clip(&format!("Delegating to {name}"), MAX_ACTIVITY_CHARS);
        }
        DomainEvent::Agent { kind: AgentKind::Completed, name, .. } => {
            record.activity = clip(&format!("{name} finished"), MAX_ACTIVITY_CHARS);
        }
        DomainEvent::Agent { kind: AgentKind::Error, name, .. } => {
            record.activity = clip(&format!("{name} failed"), MAX_ACTIVITY_CHARS);
        }
        DomainEvent::Error { kind, message, .. } => {
            if *kind == Severity::Error {
                record.transition(AgentState::Error, at);
            }
            record.activity = clip(message, MAX_ACTIVITY_CHARS);
        }
        DomainEvent::Summary { summary, .. } => {
            record.summary = Some(summary.clone());
        }
    }
}

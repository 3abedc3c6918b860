//! Group state machine
//!
//! Tracks cooldown windows and retry counters per failover group and picks
//! the single active group. A group enters cooldown when its retry counter
//! passes `max_retries` or when a request exhausted every member endpoint.
//! One mutex guards the whole map; groups are few and contention is low.

use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct GroupState {
    name: String,
    priority: u32,
    order: usize,
    cooldown_until: Option<Instant>,
    retry_count: u32,
    members: Vec<String>,
}

impl GroupState {
    fn in_cooldown(&self, now: Instant) -> bool {
        self.cooldown_until.is_some_and(|until| until > now)
    }
}

/// Read-only view of a group for handlers and logs
#[derive(Debug, Clone)]
pub struct GroupSnapshot {
    /// Group name
    pub name: String,
    /// Group priority, lower preferred
    pub priority: u32,
    /// Member endpoint names
    pub members: Vec<String>,
    /// Remaining cooldown, if any
    pub cooldown_remaining: Option<Duration>,
    /// Consecutive group-wide failures so far
    pub retry_count: u32,
}

/// Cooldown and activation tracking over all failover groups
#[derive(Debug)]
pub struct GroupManager {
    groups: Mutex<Vec<GroupState>>,
    cooldown: Duration,
    max_retries: u32,
}

impl GroupManager {
    /// Derive groups from the endpoint declarations
    ///
    /// `(name, group_priority, member)` tuples must arrive in endpoint
    /// declaration order; the first mention of a group fixes its priority
    /// and its tie-break position.
    pub fn new(
        endpoints: impl IntoIterator<Item = (String, u32, String)>,
        cooldown: Duration,
        max_retries: u32,
    ) -> Self {
        let mut groups: Vec<GroupState> = Vec::new();
        for (group, priority, member) in endpoints {
            match groups.iter_mut().find(|g| g.name == group) {
                Some(existing) => existing.members.push(member),
                None => groups.push(GroupState {
                    name: group,
                    priority,
                    order: groups.len(),
                    cooldown_until: None,
                    retry_count: 0,
                    members: vec![member],
                }),
            }
        }

        Self {
            groups: Mutex::new(groups),
            cooldown,
            max_retries,
        }
    }

    /// Evaluate cooldowns and designate the single active group
    ///
    /// Expired cooldowns flip back to active with their counters cleared.
    /// Returns `None` only when every group is still cooling down.
    pub fn select_active(&self) -> Option<String> {
        let now = Instant::now();
        let mut groups = self.groups.lock();

        for group in groups.iter_mut() {
            if group.cooldown_until.is_some_and(|until| until <= now) {
                group.cooldown_until = None;
                group.retry_count = 0;
                info!(group = %group.name, "Group cooldown expired, back in rotation");
            }
        }

        groups
            .iter()
            .filter(|g| !g.in_cooldown(now))
            .min_by_key(|g| (g.priority, g.order))
            .map(|g| g.name.clone())
    }

    /// Record a group-wide failure
    ///
    /// `all_members_exhausted` is set by the driver when the failing request
    /// attempted every member endpoint of the group.
    pub fn mark_failed(&self, name: &str, all_members_exhausted: bool) {
        let now = Instant::now();
        let mut groups = self.groups.lock();

        let Some(idx) = groups.iter().position(|g| g.name == name) else {
            return;
        };
        groups[idx].retry_count += 1;

        if groups[idx].retry_count > self.max_retries || all_members_exhausted {
            groups[idx].cooldown_until = Some(now + self.cooldown);
            groups[idx].retry_count = 0;

            let next = groups
                .iter()
                .filter(|g| g.name != name && !g.in_cooldown(now))
                .min_by_key(|g| (g.priority, g.order))
                .map(|g| g.name.clone());
            match next {
                Some(next) => warn!(
                    group = name,
                    cooldown = ?self.cooldown,
                    next_group = %next,
                    "Group entered cooldown"
                ),
                None => warn!(
                    group = name,
                    cooldown = ?self.cooldown,
                    "Group entered cooldown, no group remains eligible"
                ),
            }
        } else {
            debug!(
                group = name,
                retries = groups[idx].retry_count,
                "Group failure recorded"
            );
        }
    }

    /// Record a group-wide success, clearing the retry counter
    pub fn mark_succeeded(&self, name: &str) {
        let mut groups = self.groups.lock();
        if let Some(group) = groups.iter_mut().find(|g| g.name == name) {
            group.retry_count = 0;
        }
    }

    /// Clear every cooldown and counter
    pub fn reset_all(&self) {
        let mut groups = self.groups.lock();
        for group in groups.iter_mut() {
            group.cooldown_until = None;
            group.retry_count = 0;
        }
        debug!("All group cooldowns and counters cleared");
    }

    /// Member names of a group
    pub fn members_of(&self, name: &str) -> Vec<String> {
        let groups = self.groups.lock();
        groups
            .iter()
            .find(|g| g.name == name)
            .map(|g| g.members.clone())
            .unwrap_or_default()
    }

    /// Snapshot of every group for status endpoints
    pub fn snapshot(&self) -> Vec<GroupSnapshot> {
        let now = Instant::now();
        let groups = self.groups.lock();
        groups
            .iter()
            .map(|g| GroupSnapshot {
                name: g.name.clone(),
                priority: g.priority,
                members: g.members.clone(),
                cooldown_remaining: g
                    .cooldown_until
                    .and_then(|until| until.checked_duration_since(now)),
                retry_count: g.retry_count,
            })
            .collect()
    }

    /// Whether the named group is currently cooling down
    pub fn in_cooldown(&self, name: &str) -> bool {
        let now = Instant::now();
        let groups = self.groups.lock();
        groups
            .iter()
            .find(|g| g.name == name)
            .is_some_and(|g| g.in_cooldown(now))
    }
}

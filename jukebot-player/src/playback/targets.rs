//! Voice target set
//!
//! Users added here receive the bot's audio directly in addition to the
//! bot's own channel. An empty set means plain channel broadcast.

/// A connected user as seen by the voice connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub session_id: u32,
    pub name: String,
}

/// Routing rule pushed to the voice connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceTargetRule {
    pub users: Vec<UserRef>,
    /// Own channel stays included while users are targeted
    pub include_own_channel: bool,
}

#[derive(Debug, Clone, Default)]
pub struct VoiceTargetSet {
    users: Vec<UserRef>,
}

impl VoiceTargetSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, or retarget one already present by re-adding it
    ///
    /// Returns true when the user was not targeted before.
    pub fn add(&mut self, user: UserRef) -> bool {
        let existed = self.remove_session(user.session_id);
        self.users.push(user);
        !existed
    }

    pub fn remove_session(&mut self, session_id: u32) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.session_id != session_id);
        self.users.len() != before
    }

    pub fn remove_name(&mut self, name: &str) -> bool {
        let before = self.users.len();
        self.users.retain(|u| u.name != name);
        self.users.len() != before
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    pub fn users(&self) -> &[UserRef] {
        &self.users
    }

    /// Full rule recomputed from the current set; `None` restores broadcast
    pub fn routing_rule(&self) -> Option<VoiceTargetRule> {
        if self.users.is_empty() {
            return None;
        }
        Some(VoiceTargetRule {
            users: self.users.clone(),
            include_own_channel: true,
        })
    }
}

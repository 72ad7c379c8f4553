// Decides whether an author's messages are subject to moderation.

use super::moderation_config::ModerationConfig;

/// True iff every user is moderated or `author_id` is an explicit target.
///
/// Pure and deterministic: it gates every outbound classification call.
pub fn in_scope(author_id: u64, config: &ModerationConfig) -> bool {
    config.moderate_all_users || config.target_users.contains(&author_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn config(all: bool, targets: &[u64]) -> ModerationConfig {
        let mut config = ModerationConfig::from_lookup(|_| None).unwrap();
        config.moderate_all_users = all;
        config.target_users = targets.iter().copied().collect::<HashSet<_>>();
        config
    }

    #[test]
    fn all_users_flag_covers_everyone() {
        let config = config(true, &[]);
        assert!(in_scope(1, &config));
        assert!(in_scope(u64::MAX, &config));
    }

    #[test]
    fn targets_only_cover_listed_authors() {
        let config = config(false, &[10, 20]);
        assert!(in_scope(10, &config));
        assert!(in_scope(20, &config));
        assert!(!in_scope(30, &config));
    }

    #[test]
    fn inert_config_covers_nobody() {
        let config = config(false, &[]);
        assert!(config.is_inert());
        for author in [0, 1, 42, u64::MAX] {
            assert!(!in_scope(author, &config));
        }
    }
}

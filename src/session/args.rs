//! Arguments passed by the client script when it opens a shell session.

use clap::{ArgAction, Parser};

/// Command line of a freshly opened remote shell, as echoed by `$@`.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "lcode", no_binary_name = true)]
pub struct SessionArgs {
    /// Leader shells spawn the report sub-shell; followers serve WebDAV.
    #[arg(
        long,
        default_value_t = true,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub leader: bool,

    /// Hub address in bash `/dev/tcp` form, `host/port`.
    #[arg(long)]
    pub server: Option<String>,

    /// Paths to open for editing, relative to the working directory.
    pub paths: Vec<String>,
}

impl SessionArgs {
    /// Parse the space-separated output of `echo -n $@`.
    pub fn parse_raw(raw: &str) -> Result<Self, clap::Error> {
        Self::try_parse_from(raw.split(' ').filter(|word| !word.is_empty()))
    }

    /// Requested edit targets, defaulting to the working directory itself.
    pub fn edit_targets(&self) -> Vec<String> {
        if self.paths.is_empty() {
            vec![".".to_string()]
        } else {
            self.paths.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = SessionArgs::parse_raw("").unwrap();
        assert!(args.leader);
        assert!(args.server.is_none());
        assert_eq!(args.edit_targets(), vec!["."]);
    }

    #[test]
    fn test_follower_with_paths() {
        let args =
            SessionArgs::parse_raw("--leader=false --server 10.0.0.2/4349 src  README.md").unwrap();
        assert!(!args.leader);
        assert_eq!(args.server.as_deref(), Some("10.0.0.2/4349"));
        assert_eq!(args.paths, vec!["src", "README.md"]);
    }

    #[test]
    fn test_bare_leader_flag_does_not_eat_paths() {
        let args = SessionArgs::parse_raw("--leader src").unwrap();
        assert!(args.leader);
        assert_eq!(args.paths, vec!["src"]);
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let err = SessionArgs::parse_raw("--bogus").unwrap_err();
        assert!(err.to_string().contains("--bogus"));
    }
}

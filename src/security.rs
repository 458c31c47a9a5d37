#![forbid(unsafe_code)]

//! Process-level guards for the importer binaries.

use nix::unistd::Uid;

use crate::error::{ImporterError, Result};

/// Scheduled imports delete metadata files and append to logs; running them
/// as root leaves root-owned files behind that a later unprivileged run can
/// no longer clean up.
pub fn refuse_root(binary: &str) -> Result<()> {
    refuse_root_for(Uid::effective(), binary)
}

fn refuse_root_for(uid: Uid, binary: &str) -> Result<()> {
    if uid.is_root() {
        return Err(ImporterError::Configuration(format!(
            "{binary} must not run as root; schedule it under the account owning the downloads and logs directories"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unprivileged_uid_is_accepted() {
        assert!(refuse_root_for(Uid::from_raw(1000), "import_channel").is_ok());
    }

    #[test]
    fn root_uid_is_rejected() {
        let err = refuse_root_for(Uid::from_raw(0), "import_channel").unwrap_err();
        assert!(err.to_string().contains("import_channel must not run as root"));
    }
}

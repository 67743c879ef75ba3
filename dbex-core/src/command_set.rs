//! The orchestrator's command-set bitset. Base commands are a bitflag set;
//! aggregates are plain unions built from them, guaranteeing the fixed
//! phase order lives in one place (the orchestrator), never duplicated per
//! aggregate.

use enumflags2::{bitflags, BitFlags};

#[bitflags]
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Drop = 0b0000_0001,
    Create = 0b0000_0010,
    Migrate = 0b0000_0100,
    Schema = 0b0000_1000,
    Reset = 0b0001_0000,
    Data = 0b0010_0000,
    /// Admin escape hatch (`Execute <sql>...`). Not part of the fixed
    /// Drop→...→Data pipeline; the orchestrator's `run` ignores this bit
    /// and callers invoke `Orchestrator::execute_sql` directly.
    Execute = 0b0100_0000,
    /// Script scaffolding sub-commands; file-system only, handled entirely
    /// in `dbex-cli`.
    Script = 0b1000_0000,
}

pub type CommandSet = BitFlags<Command>;

/// Bit-union aggregates: the orchestrator only ever consumes the base set,
/// so these are just named unions.
pub mod aggregates {
    use super::{Command, CommandSet};

    pub fn deploy() -> CommandSet {
        Command::Create | Command::Migrate | Command::Schema
    }

    pub fn deploy_with_data() -> CommandSet {
        deploy() | Command::Data
    }

    pub fn all() -> CommandSet {
        deploy_with_data()
    }

    pub fn drop_and_all() -> CommandSet {
        Command::Drop | all()
    }

    pub fn reset_and_all() -> CommandSet {
        Command::Reset | all()
    }

    pub fn reset_and_data() -> CommandSet {
        Command::Reset | Command::Data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deploy_with_data_is_deploy_plus_data() {
        assert_eq!(aggregates::deploy_with_data(), aggregates::deploy() | Command::Data);
    }

    #[test]
    fn drop_and_all_contains_drop() {
        assert!(aggregates::drop_and_all().contains(Command::Drop));
    }

    #[test]
    fn execute_and_script_are_not_in_all() {
        assert!(!aggregates::all().contains(Command::Execute));
        assert!(!aggregates::all().contains(Command::Script));
    }
}

//! Skills system: discovery, parsing, the two-tier registry, and the
//! sandboxed executor with its execution journal.
//!
//! A skill is a directory containing a `SKILL.md` file with YAML frontmatter
//! and one executable script. Skills load from two tiers; a user-tier skill
//! overrides a builtin skill of the same name.

pub mod catalog;
pub mod executor;
pub mod journal;
pub mod parse;
pub mod registry;
pub mod types;

pub use {
    executor::{ExecOpts, SkillExecutor},
    journal::{Journal, JournalRecord},
    registry::SkillRegistry,
    types::{ExecutionResult, Skill, SkillAccess, SkillMetadata, SkillSchedule, Tier},
};

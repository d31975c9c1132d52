//! Commands the binary can run, and how each one is executed.

use std::sync::Arc;

use mediaforge_core::media::MediaKind;
use mediaforge_core::processor::{JobRequest, ProcessOptions};
use mediaforge_core::transform::{ExecutionMode, InfoTransform, MirrorTransform, ReverseTransform};

/// How a command's transform runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runs {
    /// On the event loop.
    Async,
    /// As a sync transform with this mode.
    Sync(ExecutionMode),
}

impl std::fmt::Display for Runs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Async => f.write_str("async"),
            Self::Sync(ExecutionMode::Inline) => f.write_str("sync, inline"),
            Self::Sync(ExecutionMode::Isolated) => f.write_str("sync, isolated worker"),
        }
    }
}

/// A registered command.
#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub name: &'static str,
    pub runs: Runs,
    pub help: &'static str,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "reverse",
        runs: Runs::Async,
        help: "Plays a video, GIF or audio file backwards",
    },
    CommandSpec {
        name: "info",
        runs: Runs::Async,
        help: "Describes a media file",
    },
    CommandSpec {
        name: "mirror",
        runs: Runs::Sync(ExecutionMode::Isolated),
        help: "Flips an image; pass `vertical` to flip top to bottom",
    },
];

/// Builds the job for `name`, or `None` for an unknown command.
pub fn build(name: &str, args: Vec<String>) -> Option<JobRequest> {
    let job = match name {
        "reverse" => JobRequest::asynchronous(Arc::new(ReverseTransform))
            .with_inputs(vec![vec![MediaKind::Video, MediaKind::Gif, MediaKind::Audio]]),
        "info" => JobRequest::asynchronous(Arc::new(InfoTransform))
            .with_inputs(vec![MediaKind::ANY.to_vec()])
            .with_options(
                ProcessOptions::default()
                    .with_resize(false)
                    .with_expect_result(false)
                    .with_queue(false),
            ),
        "mirror" => JobRequest::synchronous(Arc::new(MirrorTransform))
            .with_inputs(vec![vec![MediaKind::Image]])
            .with_options(ProcessOptions::default().with_mode(ExecutionMode::Isolated)),
        _ => return None,
    };
    Some(job.with_args(args))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediaforge_core::processor::JobTransform;
    use mediaforge_core::transform::sync_registry;

    #[test]
    fn test_every_listed_command_builds() {
        for spec in COMMANDS {
            let job = build(spec.name, Vec::new()).unwrap();
            assert_eq!(job.transform.name(), spec.name);
            match (spec.runs, &job.transform) {
                (Runs::Async, JobTransform::Async(_)) => {}
                (Runs::Sync(mode), JobTransform::Sync(_)) => assert_eq!(job.options.mode, mode),
                (runs, transform) => panic!("{} listed as {} but built {:?}", spec.name, runs, transform),
            }
        }
    }

    #[test]
    fn test_isolated_commands_are_in_worker_registry() {
        let registry = sync_registry();
        for spec in COMMANDS {
            if spec.runs == Runs::Sync(ExecutionMode::Isolated) {
                assert!(registry.get(spec.name).is_some(), "{} missing", spec.name);
            }
        }
    }

    #[test]
    fn test_unknown_command() {
        assert!(build("explode", Vec::new()).is_none());
    }

    #[test]
    fn test_info_does_not_expect_a_file() {
        let job = build("info", vec!["x".into()]).unwrap();
        assert!(!job.options.expect_result);
        assert!(!job.options.queue);
        assert_eq!(job.args, vec!["x".to_string()]);
    }
}

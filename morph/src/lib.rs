//! Plan execution engine for automated code refactoring.
//!
//! A plan is an ordered list of steps: shell commands, generated transform
//! scripts applied to a single target file, and verification commands. The
//! engine runs the steps strictly in sequence, streams progress to a
//! [`Notifier`](io::notifier::Notifier), and gives a failed verification one
//! chance at self-correction before failing the plan.
//!
//! - **[`core`]**: Pure logic (plan model, status transitions, placeholder
//!   resolution, plan checks, correction budget). No I/O.
//! - **[`io`]**: Side effects (processes, generator backends, workspace files,
//!   locks, config, plan files, event sinks). Behind traits where tests need fakes.
//!
//! [`dispatch`], [`correction`] and [`execute`] coordinate the two.

pub mod core;
pub mod correction;
pub mod dispatch;
pub mod error;
pub mod execute;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

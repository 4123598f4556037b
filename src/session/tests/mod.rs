//! End-to-end session behavior on a paused clock

mod failures;

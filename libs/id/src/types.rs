//! Identifier types used across the scheduler.

use crate::define_id;

define_id!(PollId, "poll");
define_id!(RequestId, "req");

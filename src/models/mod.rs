// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod chat;
pub mod identity;
pub mod profile;
pub mod schedule;
pub mod session;

pub use chat::ChatMessage;
pub use identity::{Identity, IdentityState};
pub use profile::{Profile, ProfileFields, ProfileUpdate, SignUpRequest, TeamRole};
pub use schedule::{group_by_month, ScheduleEntry, ScheduleFilter};
pub use session::{MemberSummary, Session, SessionPhase};

// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - backend clients and member features.

pub mod firebase_auth;
pub mod identity;
pub mod memory_auth;
pub mod storage;
pub mod team;

pub use firebase_auth::FirebaseAuthClient;
pub use identity::{IdentityProvider, IdentitySubscription};
pub use memory_auth::MemoryIdentityProvider;
pub use storage::{FirebaseStorage, MemoryObjectStore, ObjectStore, ProfileImage, UploadProgress};
pub use team::{ChatSubscription, TeamService};

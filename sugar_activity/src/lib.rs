/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Launching and tracking Sugar activities.
//!
//! # Model
//!
//! An _activity_ is a launchable application. Each activity type is served
//! by a _factory_: a service exported on the bus under the activity type's
//! name, which creates instances on request and keeps track of them until
//! they are destroyed.
//!
//! * A client asks a factory to create an instance. The factory replies
//!   with a _token_ that identifies the new instance within its process,
//!   and the client resolves the instance's own address from that token.
//! * An instance notifies its factory when it terminates.
//! * When the last instance of a factory that has created at least one is
//!   destroyed, the factory runs the type's `stop` hook and shuts down,
//!   signalling the hosting process.
//!
//! | Entity   | Address                                               |
//! |----------|-------------------------------------------------------|
//! | Factory  | `org.example.Foo` at `/org/example/Foo`               |
//! | Activity | `org.laptop.Activity<token>` at `/org/laptop/Activity/<token>` |
//!
//! [`factory::ActivityFactory`] implements the factory,
//! [`creation::ActivityCreationHandler`] the client, and [`bus::Bus`] the
//! in-process bus both of them are exported on.

#![deny(missing_docs)]

pub mod activity;
pub mod allocator;
pub mod bundle;
pub mod bus;
pub mod config;
pub mod creation;
pub mod factory;
pub mod logging;
pub mod reference;
pub mod registry;
pub mod shutdown;
/// Test utilities
pub mod test_utils;

/// Re-exports of external crates used by macros.
/// This module is not part of the public API and should not be used directly.
#[doc(hidden)]
pub mod internal_macro_support {
    pub use inventory;
}

pub use activity::Activity;
pub use activity::ActivityClass;
pub use activity::ActivityContext;
pub use activity::ActivityProxy;
pub use activity::DestroyNotifier;
pub use allocator::ActivityHandleAllocator;
pub use bundle::Bundle;
pub use bundle::BundleRegistry;
pub use bus::Bus;
pub use creation::ActivityCreationHandler;
pub use creation::CreationError;
pub use creation::create;
pub use factory::ActivityFactory;
pub use factory::FactoryHandle;
pub use factory::FactoryParams;
pub use factory::FactoryStatus;
pub use factory::start_factory;
pub use reference::ActivityToken;
pub use reference::BusName;
pub use reference::ObjectPath;
pub use reference::get_path;
pub use registry::ActivityRegistry;
pub use registry::ActivityType;
pub use shutdown::ShutdownReason;

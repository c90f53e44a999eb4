// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Decisions made by the IKS control plane, free of any database access
//!
//! Everything here is a pure function over explicit inputs.  The datastore
//! gathers rows, calls into this crate to decide what to do, and then does
//! it.

pub mod guard;
pub mod naming;
pub mod quota;
pub mod transition;
pub mod upgrade;
pub mod version;

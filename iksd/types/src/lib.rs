// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Types shared between the IKS control plane and its callers
//!
//! * [`status`]: the status report the operator sends after acting on a
//!   cluster
//! * [`document`]: the desired-state document stored with each cluster
//!   revision
//! * [`params`]: inputs of the mutating handlers
//! * [`views`]: results returned by the control plane

pub mod document;
pub mod params;
pub mod status;
pub mod views;

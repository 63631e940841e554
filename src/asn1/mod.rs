// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Low-level ASN.1 structure definitions.

One module per defining document. These types exist for (de)serialization
only; see the crate root for the high-level interfaces.
*/

pub mod common;
pub mod guardtime;
pub mod rfc3161;
pub mod rfc3280;
pub mod rfc5280;
pub mod rfc5652;

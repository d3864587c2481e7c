// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Architecture-specific code
//!
//! Only the execution-context primitive is architecture specific. Each
//! architecture provides a [`Context`] with `bootstrap` and a `switch`
//! function; everything above this module is portable.

pub mod amd64;

pub use amd64::switch::{switch, Context, StartFn};

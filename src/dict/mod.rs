/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Static compressed sequences.

*/

pub mod elias_fano;
pub use elias_fano::{EliasFano, EliasFanoBuilder};

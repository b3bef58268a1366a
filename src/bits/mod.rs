/*
 *
 * SPDX-FileCopyrightText: 2025 Sebastiano Vigna
 *
 * SPDX-License-Identifier: Apache-2.0 OR LGPL-2.1-or-later
 */

/*!

Bit vectors and vectors of values of fixed bit width.

*/

pub mod bit_vec;
pub use bit_vec::BitVec;

pub mod bit_field_vec;
pub use bit_field_vec::BitFieldVec;

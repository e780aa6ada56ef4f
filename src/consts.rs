// Copyright (c) 2025 Syswonder
// ion-tiler is licensed under Mulan PSL v2.
// You can use this software according to the terms and conditions of the Mulan PSL v2.
// You may obtain a copy of Mulan PSL v2 at:
//     http://license.coscl.org.cn/MulanPSL2
// THIS SOFTWARE IS PROVIDED ON AN "AS IS" BASIS, WITHOUT WARRANTIES OF ANY KIND, EITHER
// EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED TO NON-INFRINGEMENT, MERCHANTABILITY OR
// FIT FOR A PARTICULAR PURPOSE.
// See the Mulan PSL v2 for more details.
//
// Syswonder Website:
//      https://www.syswonder.org
//
// Authors:
//
pub use crate::memory::{PAGE_SHIFT, PAGE_SIZE};

/// Width of the tiler container, in slots.
pub const TILER_WIDTH: usize = 256;
/// Height of the tiler container, in slots.
pub const TILER_HEIGHT: usize = 128;

/// Size of each tiler view (8bit, 16bit, 32bit, page).
pub const TILER_VIEW_SIZE: usize = 1 << 27; // 128 MB

pub const TILVIEW_8BIT: usize = 0x6000_0000;
pub const TILVIEW_16BIT: usize = TILVIEW_8BIT + TILER_VIEW_SIZE;
pub const TILVIEW_32BIT: usize = TILVIEW_16BIT + TILER_VIEW_SIZE;
pub const TILVIEW_PAGE: usize = TILVIEW_32BIT + TILER_VIEW_SIZE;
pub const TILVIEW_END: usize = TILVIEW_PAGE + TILER_VIEW_SIZE;

/// Slots reserved for the page mode (1D) area, carved out of the bottom rows
/// of the container.
pub const TILER_1D_SLOTS: usize = TILER_WIDTH * 32;
/// Rows of the container left to the 2D area.
pub const TILER_2D_ROWS: usize = TILER_HEIGHT - TILER_1D_SLOTS / TILER_WIDTH;

/// Largest carveout a heap pool can track (64K pages = 256 MB).
pub const CARVEOUT_MAX_PAGES: usize = 0x10000;

pub const HEAP_NAME_MAXLEN: usize = 32;

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
//! Scatter-gather description of a buffer's physical pages.

use alloc::vec::Vec;
use core::slice;

use super::{MemoryMap, PhysAddr, PAGE_SIZE};
use crate::error::IonResult;

/// One physically contiguous segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SgEntry {
    pub paddr: PhysAddr,
    pub length: usize,
    pub offset: usize,
}

#[derive(Debug, Default)]
pub struct SgTable {
    entries: Vec<SgEntry>,
}

impl SgTable {
    /// An empty table, for buffers whose pages are owned elsewhere.
    pub const fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Allocate room for exactly `nents` segments.
    pub fn alloc(nents: usize) -> IonResult<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(nents)
            .map_err(|_| ion_err!(ENOMEM, format!("sg table of {} entries", nents)))?;
        Ok(Self { entries })
    }

    /// Describe `pages`: a single segment for a lump, one segment per page
    /// otherwise. Every page must have a page descriptor in `memmap`.
    pub fn from_pages(pages: &[PhysAddr], lump: bool, memmap: &MemoryMap) -> IonResult<Self> {
        if lump {
            let mut table = Self::alloc(1)?;
            table.set_page(pages[0], pages.len() * PAGE_SIZE, memmap)?;
            return Ok(table);
        }
        let mut table = Self::alloc(pages.len())?;
        for &paddr in pages {
            table.set_page(paddr, PAGE_SIZE, memmap)?;
        }
        Ok(table)
    }

    fn set_page(&mut self, paddr: PhysAddr, length: usize, memmap: &MemoryMap) -> IonResult {
        if !memmap.has_page(paddr) {
            error!("No struct page found for address {:#010x}", paddr);
            return ion_result_err!(
                EFAULT,
                format!("physical address {:#x} has no page descriptor", paddr)
            );
        }
        self.entries.push(SgEntry {
            paddr,
            length,
            offset: 0,
        });
        Ok(())
    }

    pub fn entries(&self) -> &[SgEntry] {
        &self.entries
    }

    pub fn iter(&self) -> slice::Iter<'_, SgEntry> {
        self.entries.iter()
    }

    pub fn nents(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of bytes described by the table.
    pub fn total_len(&self) -> usize {
        self.entries.iter().map(|e| e.length).sum()
    }
}

impl<'a> IntoIterator for &'a SgTable {
    type Item = &'a SgEntry;
    type IntoIter = slice::Iter<'a, SgEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lump_is_one_segment() {
        let memmap = MemoryMap::new().with_ram(0x8000_0000, 0x10_0000);
        let pages: Vec<_> = (0..4).map(|i| 0x8000_0000 + i * PAGE_SIZE).collect();
        let table = SgTable::from_pages(&pages, true, &memmap).unwrap();
        assert_eq!(
            table.entries(),
            &[SgEntry {
                paddr: 0x8000_0000,
                length: 4 * PAGE_SIZE,
                offset: 0
            }]
        );
    }

    #[test]
    fn test_pages_get_one_segment_each() {
        let memmap = MemoryMap::new().with_ram(0x8000_0000, 0x10_0000);
        let pages = [0x8000_3000, 0x8000_1000, 0x8000_7000];
        let table = SgTable::from_pages(&pages, false, &memmap).unwrap();
        assert_eq!(table.nents(), 3);
        assert_eq!(table.total_len(), 3 * PAGE_SIZE);
        let addrs: Vec<_> = table.iter().map(|e| e.paddr).collect();
        assert_eq!(addrs, pages);
    }

    #[test]
    fn test_page_without_descriptor() {
        let memmap = MemoryMap::new().with_ram(0x8000_0000, 0x2000);
        let pages = [0x8000_0000, 0x8000_1000, 0x9000_0000];
        let err = SgTable::from_pages(&pages, false, &memmap).unwrap_err();
        assert_eq!(err.num, crate::error::IonErrorNum::EFAULT);
        assert_eq!(err.code(), -14);
    }
}

//! Simulated backend for allocator tests
//!
//! Hands out addresses from a private range, keeps every live region in a
//! list, records each call and fails on demand.

use alloc::vec::Vec;

use silo_hal::{HalError, HalResult, NodeBackend, OsNode, ReserveRequest, SystemInfo, VirtAddr};
use spin::Mutex;

/// Default allocation unit of the simulated system
pub const UNIT: usize = 4096;

const LARGE_PAGE: usize = 2 << 20;
/// First address handed out for a fresh range
pub const ARENA_BASE: usize = 0x7000_0000_0000;

/// One backend call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Reserve(ReserveRequest),
    Release { addr: VirtAddr, size: usize },
}

#[derive(Debug, Clone, Copy)]
struct Region {
    addr: VirtAddr,
    size: usize,
    /// Mapped by someone other than the allocator
    foreign: bool,
}

impl Region {
    fn overlaps(&self, addr: VirtAddr, size: usize) -> bool {
        addr.as_usize() < self.addr.as_usize() + self.size
            && self.addr.as_usize() < addr.as_usize() + size
    }
}

#[derive(Debug, Default)]
struct State {
    regions: Vec<Region>,
    next: usize,
    calls: Vec<Call>,
    fail_probe: bool,
    fail_nodes: Vec<OsNode>,
    fail_releases: Vec<VirtAddr>,
    no_large_pages: bool,
    steal: Option<(usize, usize)>,
    misplace: bool,
    last_probe: Option<VirtAddr>,
}

#[derive(Debug)]
pub struct MockBackend {
    granularity: usize,
    state: Mutex<State>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::with_granularity(UNIT)
    }

    pub fn with_granularity(granularity: usize) -> Self {
        Self {
            granularity,
            state: Mutex::new(State {
                next: ARENA_BASE,
                ..State::default()
            }),
        }
    }

    /// Every probe reservation fails
    pub fn fail_probe(&self) {
        self.state.lock().fail_probe = true;
    }

    /// Every commit pinned to `node` fails
    pub fn fail_node(&self, node: OsNode) {
        self.state.lock().fail_nodes.push(node);
    }

    /// Releasing the region at `addr` fails
    pub fn fail_release(&self, addr: VirtAddr) {
        self.state.lock().fail_releases.push(addr);
    }

    /// Large-page requests fail
    pub fn without_large_pages(&self) {
        self.state.lock().no_large_pages = true;
    }

    /// Ignore explicit addresses and place regions anywhere
    pub fn misplace_commits(&self) {
        self.state.lock().misplace = true;
    }

    /// Map `size` bytes at `offset` into the next probed range once the probe
    /// is released, as another thread of the process would
    pub fn steal_after_probe(&self, offset: usize, size: usize) {
        self.state.lock().steal = Some((offset, size));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    /// Successful and failed release calls, in order
    pub fn releases(&self) -> Vec<(VirtAddr, usize)> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match *call {
                Call::Release { addr, size } => Some((addr, size)),
                Call::Reserve(_) => None,
            })
            .collect()
    }

    /// Committing reserve calls, in order
    pub fn commit_calls(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Reserve(r) if r.commits()))
            .count()
    }

    pub fn probe_count(&self) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|call| matches!(call, Call::Reserve(r) if !r.commits()))
            .count()
    }

    /// Bytes held by the allocator, not counting foreign mappings
    pub fn live_bytes(&self) -> usize {
        self.state
            .lock()
            .regions
            .iter()
            .filter(|r| !r.foreign)
            .map(|r| r.size)
            .sum()
    }

    fn unit_for(&self, request: &ReserveRequest) -> usize {
        if request.wants_large_pages() {
            LARGE_PAGE
        } else {
            self.granularity
        }
    }
}

impl NodeBackend for MockBackend {
    fn system_info(&self) -> SystemInfo {
        SystemInfo {
            page_size: UNIT,
            allocation_granularity: self.granularity,
            large_page_minimum: Some(LARGE_PAGE),
        }
    }

    fn reserve(&self, request: &ReserveRequest) -> HalResult<VirtAddr> {
        let unit = self.unit_for(request);
        let mut state = self.state.lock();
        state.calls.push(Call::Reserve(*request));

        if request.size == 0 {
            return Err(HalError::ZeroSize);
        }
        if !request.commits() && state.fail_probe {
            return Err(HalError::OutOfMemory { size: request.size });
        }
        if request.wants_large_pages() && state.no_large_pages {
            return Err(HalError::LargePagesUnavailable);
        }
        if let Some(node) = request.node {
            if request.commits() && state.fail_nodes.contains(&node) {
                return Err(HalError::BindFailed { node, code: 22 });
            }
        }

        let placement = request.addr.filter(|_| !state.misplace);
        let addr = match placement {
            Some(addr) => {
                if state.regions.iter().any(|r| r.overlaps(addr, request.size)) {
                    return Err(HalError::AddressUnavailable {
                        addr,
                        size: request.size,
                    });
                }
                addr
            },
            None => {
                // Leave a one-unit hole after every fresh range.
                let addr = (state.next + unit - 1) / unit * unit;
                state.next = addr + request.size + unit;
                VirtAddr::new(addr)
            },
        };
        if !request.commits() && request.addr.is_none() {
            state.last_probe = Some(addr);
        }

        state.regions.push(Region {
            addr,
            size: request.size,
            foreign: false,
        });
        Ok(addr)
    }

    unsafe fn release(&self, addr: VirtAddr, size: usize) -> HalResult<()> {
        let mut state = self.state.lock();
        state.calls.push(Call::Release { addr, size });

        if state.fail_releases.contains(&addr) {
            return Err(HalError::ReleaseFailed {
                addr,
                size,
                code: 22,
            });
        }

        let Some(index) = state
            .regions
            .iter()
            .position(|r| !r.foreign && r.addr == addr && r.size == size)
        else {
            return Err(HalError::ReleaseFailed {
                addr,
                size,
                code: 22,
            });
        };
        let region = state.regions.remove(index);

        // A probe just went away: let the intruder in.
        if state.last_probe == Some(addr) {
            state.last_probe = None;
            if let Some((offset, len)) = state.steal.take() {
                state.regions.push(Region {
                    addr: region.addr + offset,
                    size: len,
                    foreign: true,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_refuses_overlap() {
        let backend = MockBackend::new();
        let probe = backend.reserve(&ReserveRequest::probe(8192)).unwrap();
        let pinned = ReserveRequest::pinned(4096, OsNode::new(0)).at(probe + 4096);
        assert!(matches!(
            backend.reserve(&pinned),
            Err(HalError::AddressUnavailable { .. })
        ));

        unsafe { backend.release(probe, 8192) }.unwrap();
        assert_eq!(backend.reserve(&pinned), Ok(probe + 4096));
        assert_eq!(backend.live_bytes(), 4096);
    }
}

//! The virtualization engine: composes an ordered list of Regions into one
//! scrollbar-addressable virtual space.
//!
//! The viewport only ever shows a window onto the virtual space. Each Region
//! gets a physical height no larger than the viewport; Regions taller than
//! the viewport scroll internally so that, stacked together, they read as one
//! continuous column. Every mutation runs a full synchronous recompute over a
//! cloned state, then the diff between old and new state is pushed out
//! through the Region trait and the registered observer callbacks.

use std::collections::HashMap;

use tracing::warn;

use crate::core::region::{region_ptr_eq, RegionGeometry, RegionRc};

/// Scrollbar model pushed to the host: total range and thumb position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollbarState {
    pub length: i64,
    pub position: i64,
}

/// Layout inputs and outputs for one Region in the stack.
#[derive(Clone)]
struct RegionSlot {
    region: RegionRc,

    // Inputs, sampled from the Region at mutation time.
    virtual_height: i64,
    min_height: i64,
    reserve_height: i64,

    // Outputs, written by compute().
    real_height: i64,
    real_top: i64,
    internal_offset: i64,
    virtual_top: i64,
    visible: bool,
}

impl RegionSlot {
    fn new(region: &RegionRc, container_height: i64) -> Self {
        let (min_height, virtual_height, reserve_height) = sample_region(region, container_height);
        Self {
            region: region.clone(),
            virtual_height,
            min_height,
            reserve_height,
            real_height: 0,
            real_top: 0,
            internal_offset: 0,
            virtual_top: 0,
            visible: false,
        }
    }

    /// Height this Region occupies in the virtual space.
    fn effective_height(&self) -> i64 {
        self.min_height.max(self.virtual_height + self.reserve_height)
    }
}

fn sample_region(region: &RegionRc, container_height: i64) -> (i64, i64, i64) {
    let region = region.borrow();
    (
        region.min_height(),
        region.virtual_height(container_height),
        region.reserve_height(container_height),
    )
}

/// The complete layout state. Cloned wholesale at the start of each mutation
/// so the previous state stays available for diffing.
#[derive(Clone, Default)]
struct AreaState {
    slots: Vec<RegionSlot>,
    virtual_offset: i64,
    container_height: i64,

    // Outputs.
    container_offset: i64,
    intersect_index: Option<usize>,
    scrollbar: ScrollbarState,
}

/// Host callbacks fired while applying a state diff.
#[derive(Default)]
struct Observers {
    scrollbar_fn: Option<Box<dyn FnMut(ScrollbarState)>>,
    scroll_fn: Option<Box<dyn FnMut(i64)>>,
    set_top_fn: Option<Box<dyn FnMut(&RegionRc, i64)>>,
    mark_visible_fn: Option<Box<dyn FnMut(&RegionRc, bool)>>,
}

pub struct VirtualScrollArea {
    state: AreaState,
    observers: Observers,
}

impl Default for VirtualScrollArea {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualScrollArea {
    pub fn new() -> Self {
        Self {
            state: AreaState::default(),
            observers: Observers::default(),
        }
    }

    // ------------------------------------------------------------------
    // Observer registration.

    /// Called with the new container scroll offset when it changes.
    pub fn set_scroll_fn(&mut self, scroll_fn: impl FnMut(i64) + 'static) {
        self.observers.scroll_fn = Some(Box::new(scroll_fn));
    }

    /// Called when the scrollbar length or position changes.
    pub fn set_scrollbar_fn(&mut self, scrollbar_fn: impl FnMut(ScrollbarState) + 'static) {
        self.observers.scrollbar_fn = Some(Box::new(scrollbar_fn));
    }

    /// Called when a Region's physical top position changes.
    pub fn set_top_fn(&mut self, set_top_fn: impl FnMut(&RegionRc, i64) + 'static) {
        self.observers.set_top_fn = Some(Box::new(set_top_fn));
    }

    /// Called when a Region is about to be mounted (before its first
    /// geometry update) or has been unmounted (after its last one).
    pub fn set_mark_visible_fn(&mut self, mark_visible_fn: impl FnMut(&RegionRc, bool) + 'static) {
        self.observers.mark_visible_fn = Some(Box::new(mark_visible_fn));
    }

    // ------------------------------------------------------------------
    // Accessors.

    pub fn scroll_offset(&self) -> i64 {
        self.state.virtual_offset
    }

    pub fn container_height(&self) -> i64 {
        self.state.container_height
    }

    pub fn total_virtual_height(&self) -> i64 {
        total_virtual_height(&self.state)
    }

    pub fn scrollbar_state(&self) -> ScrollbarState {
        self.state.scrollbar
    }

    /// Index of the Region containing the virtual scroll offset.
    pub fn intersect_index(&self) -> Option<usize> {
        self.state.intersect_index
    }

    pub fn region_count(&self) -> usize {
        self.state.slots.len()
    }

    pub fn at_bottom(&self) -> bool {
        self.state.virtual_offset >= total_virtual_height(&self.state) - self.state.container_height
    }

    /// Virtual top of a Region, or `None` when it is not in the stack.
    pub fn region_top(&self, region: &RegionRc) -> Option<i64> {
        self.find_slot(region).map(|slot| slot.virtual_top)
    }

    pub fn region_virtual_height(&self, region: &RegionRc) -> Option<i64> {
        self.find_slot(region).map(|slot| slot.virtual_height)
    }

    pub fn region_visible(&self, region: &RegionRc) -> Option<bool> {
        self.find_slot(region).map(|slot| slot.visible)
    }

    /// Effective height of every Region, oldest first.
    pub fn region_heights(&self) -> Vec<i64> {
        self.state
            .slots
            .iter()
            .map(RegionSlot::effective_height)
            .collect()
    }

    fn find_slot(&self, region: &RegionRc) -> Option<&RegionSlot> {
        self.state
            .slots
            .iter()
            .find(|slot| region_ptr_eq(&slot.region, region))
    }

    // ------------------------------------------------------------------
    // Region list mutation.

    pub fn append_region(&mut self, region: &RegionRc) {
        let slot = RegionSlot::new(region, self.state.container_height);
        self.update_autoscroll_bottom(move |state| {
            state.slots.push(slot);
        });
    }

    /// Remove a Region. When the scroll offset currently sits inside it the
    /// offset is clamped back to the Region's former start; content after it
    /// shifts up by its height.
    pub fn remove_region(&mut self, region: &RegionRc) {
        if self.find_slot(region).is_none() {
            warn!("remove_region: region is not in the stack");
            return;
        }
        let target = region.clone();
        self.update_autoscroll_bottom(move |state| {
            let mut offset = state.virtual_offset;
            let mut accumulated = 0;
            for slot in &state.slots {
                let height = slot.effective_height();
                if region_ptr_eq(&slot.region, &target) {
                    if offset >= accumulated {
                        if offset < accumulated + height {
                            // The offset is inside the removed Region.
                            offset = accumulated;
                        } else {
                            offset -= height;
                        }
                    }
                    break;
                }
                accumulated += height;
            }
            state.virtual_offset = offset;
            state
                .slots
                .retain(|slot| !region_ptr_eq(&slot.region, &target));
        });
    }

    /// Swap a Region for another in the same stack position.
    pub fn replace_region(&mut self, old_region: &RegionRc, new_region: &RegionRc) {
        let (min_height, virtual_height, reserve_height) =
            sample_region(new_region, self.state.container_height);
        let old_region = old_region.clone();
        let new_region = new_region.clone();
        self.update_autoscroll_bottom(move |state| {
            for slot in &mut state.slots {
                if region_ptr_eq(&slot.region, &old_region) {
                    slot.region = new_region.clone();
                    slot.min_height = min_height;
                    slot.virtual_height = virtual_height;
                    slot.reserve_height = reserve_height;
                    slot.real_height = 0;
                    slot.internal_offset = 0;
                }
            }
        });
    }

    // ------------------------------------------------------------------
    // Geometry mutation.

    pub fn set_container_height(&mut self, container_height: i64) {
        self.update_autoscroll_bottom(move |state| {
            state.container_height = container_height;
        });
    }

    /// Scroll to the given virtual offset. Returns the offset actually used
    /// after clamping into the valid range.
    pub fn scroll_to(&mut self, offset: i64) -> i64 {
        let limit = (total_virtual_height(&self.state) - self.state.container_height).max(0);
        let clean_offset = offset.clamp(0, limit);
        self.update(move |state| {
            state.virtual_offset = clean_offset;
        });
        clean_offset
    }

    pub fn scroll_to_bottom(&mut self) -> i64 {
        if self.state.slots.is_empty() {
            return self.state.virtual_offset;
        }
        self.scroll_to(total_virtual_height(&self.state) - self.state.container_height)
    }

    /// Scroll the smallest amount which brings the virtual range
    /// `[top, bottom]` fully into view. The usable viewport top sits below
    /// the intersected Region's reserved chrome.
    pub fn scroll_into_view(&mut self, top: i64, bottom: i64) -> i64 {
        let Some(intersect_index) = self.state.intersect_index else {
            warn!("scroll_into_view: no region intersects the current offset");
            return self.state.virtual_offset;
        };
        let reserve = self.state.slots[intersect_index].reserve_height;
        let viewport_top = self.state.virtual_offset + reserve;

        let mut offset = self.state.virtual_offset;
        if top < viewport_top {
            offset -= viewport_top - top;
        }
        let viewport_bottom = self.state.virtual_offset + self.state.container_height;
        if bottom > viewport_bottom {
            offset += bottom - viewport_bottom;
        }
        if offset != self.state.virtual_offset {
            self.scroll_to(offset)
        } else {
            self.state.virtual_offset
        }
    }

    /// Re-sample one Region's sizes and relayout. Does nothing when the
    /// sizes are unchanged. The scan runs newest-first since the Region
    /// which changed is almost always the live one at the tail.
    pub fn update_region_size(&mut self, region: &RegionRc) {
        let (min_height, virtual_height, reserve_height) =
            sample_region(region, self.state.container_height);

        for slot in self.state.slots.iter().rev() {
            if region_ptr_eq(&slot.region, region) {
                if slot.virtual_height == virtual_height
                    && slot.min_height == min_height
                    && slot.reserve_height == reserve_height
                {
                    return;
                }
                break;
            }
        }

        let target = region.clone();
        self.update_autoscroll_bottom(move |state| {
            for slot in &mut state.slots {
                if region_ptr_eq(&slot.region, &target) {
                    slot.min_height = min_height;
                    slot.virtual_height = virtual_height;
                    slot.reserve_height = reserve_height;
                }
            }
        });
    }

    /// Re-sample several Regions in one batch with a single recompute.
    pub fn update_region_sizes(&mut self, regions: &[RegionRc]) {
        let container_height = self.state.container_height;
        let targets: Vec<RegionRc> = regions.to_vec();
        self.update_autoscroll_bottom(move |state| {
            for slot in &mut state.slots {
                if targets
                    .iter()
                    .any(|target| region_ptr_eq(&slot.region, target))
                {
                    let (min_height, virtual_height, reserve_height) =
                        sample_region(&slot.region, container_height);
                    slot.min_height = min_height;
                    slot.virtual_height = virtual_height;
                    slot.reserve_height = reserve_height;
                }
            }
        });
    }

    /// Recompute and push out any drift between the derived state and what
    /// has been applied. A reapply with no intervening mutation performs
    /// zero Region updates.
    pub fn reapply_state(&mut self) {
        self.update(|_| {});
    }

    // ------------------------------------------------------------------
    // Update drivers.

    fn update(&mut self, mutator: impl FnOnce(&mut AreaState)) {
        let mut new_state = self.state.clone();
        mutator(&mut new_state);
        compute(&mut new_state);
        apply_state(&self.state, &new_state, &mut self.observers);
        self.state = new_state;
    }

    /// Like `update`, but when the offset was at the bottom beforehand it is
    /// re-pinned to the new bottom afterwards. This is the autoscroll law:
    /// content mutations follow the tail, explicit scrolls never do.
    fn update_autoscroll_bottom(&mut self, mutator: impl FnOnce(&mut AreaState)) {
        let was_at_bottom = self.at_bottom();

        let mut new_state = self.state.clone();
        mutator(&mut new_state);
        compute(&mut new_state);

        if was_at_bottom {
            new_state.virtual_offset =
                (total_virtual_height(&new_state) - new_state.container_height).max(0);
            compute(&mut new_state);
        }

        apply_state(&self.state, &new_state, &mut self.observers);
        self.state = new_state;
    }
}

fn total_virtual_height(state: &AreaState) -> i64 {
    state
        .slots
        .iter()
        .map(RegionSlot::effective_height)
        .sum()
}

/// Derive every output field from the inputs and the virtual offset.
///
/// Each Region's physical window is "attracted" to the virtual offset: a
/// Region taller than the viewport scrolls internally so the part of it
/// around the offset shows through, and the container offset lands on the
/// physical pixel corresponding to the virtual offset.
fn compute(state: &mut AreaState) {
    let viewport_height = state.container_height;
    let pos = state.virtual_offset;
    let mut real_top = 0;
    let mut virtual_top = 0;
    state.intersect_index = None;

    for (index, slot) in state.slots.iter_mut().enumerate() {
        slot.virtual_top = virtual_top;
        slot.real_top = real_top;
        let effective_height = slot.effective_height();

        if effective_height <= viewport_height {
            // Fits entirely inside the viewport; no internal scrolling.
            slot.real_height = effective_height;
            slot.internal_offset = 0;

            let virtual_bottom = virtual_top + effective_height;
            if pos >= virtual_top && pos < virtual_bottom {
                state.container_offset = real_top + pos - virtual_top;
                state.intersect_index = Some(index);
                slot.visible = true;
            } else {
                let pos_bottom = pos + viewport_height;
                slot.visible = !(pos >= virtual_bottom || pos_bottom < virtual_top);
            }
        } else {
            // Taller than the viewport: virtual scrolling inside the Region.
            let virtual_bottom = virtual_top + effective_height;
            slot.real_height = slot.min_height.max(viewport_height);

            if pos < virtual_bottom {
                if pos >= virtual_top {
                    // The offset is inside this Region.
                    state.intersect_index = Some(index);

                    if pos + viewport_height >= virtual_bottom {
                        // The viewport sticks out past the Region's end;
                        // align the Region's tail with the viewport share it
                        // gets and push the remainder onto the container.
                        slot.internal_offset = pos - virtual_top;
                        state.container_offset =
                            real_top + (pos + viewport_height - virtual_bottom);
                        slot.visible = true;
                    } else {
                        // Region top aligned with the viewport top.
                        slot.internal_offset = pos - virtual_top;
                        state.container_offset = real_top;
                        slot.visible = true;
                    }
                } else {
                    // Region starts below the offset.
                    slot.internal_offset = 0;
                    slot.visible = pos + viewport_height >= virtual_top;
                }
            } else {
                // Region ends above the offset; parked showing its tail.
                slot.internal_offset = effective_height - (viewport_height - slot.reserve_height);
                slot.visible = false;
            }
        }

        real_top += slot.real_height;
        virtual_top += effective_height;
    }

    let length = total_virtual_height(state);
    state.scrollbar = ScrollbarState {
        length,
        position: state.virtual_offset,
    };
}

/// Push the difference between two derived states out to the Regions and the
/// observer callbacks.
///
/// Ordering contract: a Region becoming visible is marked visible before its
/// geometry update; one becoming invisible gets its geometry update first and
/// is unmounted last. The container scroll callback fires exactly once, and
/// only when the offset changed.
fn apply_state(old: &AreaState, new: &AreaState, observers: &mut Observers) {
    if old.scrollbar != new.scrollbar {
        if let Some(scrollbar_fn) = observers.scrollbar_fn.as_mut() {
            scrollbar_fn(new.scrollbar);
        }
    }

    let old_slots: HashMap<*const (), &RegionSlot> = old
        .slots
        .iter()
        .map(|slot| (std::rc::Rc::as_ptr(&slot.region) as *const (), slot))
        .collect();

    for new_slot in &new.slots {
        let key = std::rc::Rc::as_ptr(&new_slot.region) as *const ();
        let old_slot = old_slots.get(&key).copied();

        let height_changed =
            old_slot.map_or(true, |slot| slot.real_height != new_slot.real_height);
        let internal_offset_changed =
            old_slot.map_or(true, |slot| slot.internal_offset != new_slot.internal_offset);
        let new_physical_top = new.container_offset - new_slot.real_top;
        let physical_top_changed = old_slot
            .map_or(true, |slot| new_physical_top != old.container_offset - slot.real_top);
        let container_height_changed = old.container_height != new.container_height;
        let top_changed = old_slot.map_or(true, |slot| slot.real_top != new_slot.real_top);
        let visible_changed = old_slot.map_or(true, |slot| slot.visible != new_slot.visible);

        if visible_changed && new_slot.visible {
            // Mount before any geometry update may assume a live Region.
            if let Some(mark_visible_fn) = observers.mark_visible_fn.as_mut() {
                mark_visible_fn(&new_slot.region, true);
            }
            new_slot.region.borrow_mut().set_visible(true);
        }

        if height_changed || internal_offset_changed || physical_top_changed
            || container_height_changed
        {
            let geometry = RegionGeometry {
                height: new_slot.real_height,
                height_changed,
                internal_offset: new_slot.internal_offset,
                internal_offset_changed,
                physical_top: new_physical_top,
                physical_top_changed,
                container_height: new.container_height,
                container_height_changed,
            };
            new_slot.region.borrow_mut().set_dimensions_and_scroll(&geometry);
        }

        if top_changed {
            if let Some(set_top_fn) = observers.set_top_fn.as_mut() {
                set_top_fn(&new_slot.region, new_slot.real_top);
            }
        }

        if visible_changed && !new_slot.visible {
            new_slot.region.borrow_mut().set_visible(false);
            if let Some(mark_visible_fn) = observers.mark_visible_fn.as_mut() {
                mark_visible_fn(&new_slot.region, false);
            }
        }
    }

    if old.container_offset != new.container_offset {
        if let Some(scroll_fn) = observers.scroll_fn.as_mut() {
            scroll_fn(new.container_offset);
        }
    }
}

//! Compile-time drift guard for production-backed models.
//!
//! If this file fails to compile, the canvas APIs the models replay against
//! have changed. Update the adapters in `toy` before touching the models.

#[allow(unused_imports)]
use pixelroom::core::{
    CanvasStore, CellHandle, Clock, EvictionQueue, Lww, Paint, PlaceOutcome, Point, Stamp,
    WriteStamp,
};

#[allow(dead_code)]
fn _drift_guard(store: &mut CanvasStore, clock: &mut Clock, paint: Paint, handle: CellHandle) {
    let stamp: Stamp = Stamp::new(clock.tick(), crate::toy::participant(0));
    let _outcome: PlaceOutcome = store.place(handle, paint, stamp);
    let _removed: Vec<CellHandle> = store.erase_at(Point::new(0.0, 0.0), 0.5);
    let _cleared: usize = store.clear();
    let _order: Vec<CellHandle> = store.handles().collect();
    let _ok: bool = store.is_consistent();
    clock.receive(&WriteStamp::new(0, 0));

    let mut register = Lww::new(paint, stamp);
    let _won: bool = register.assign(paint, stamp);
    let mut queue: EvictionQueue<CellHandle> = EvictionQueue::new();
    let _ = queue.push(handle);
    let _ = queue.pop_oldest();
}

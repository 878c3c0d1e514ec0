//! C-boundary behavior of the buddy_* entry points.

use std::ffi::c_void;
use std::ptr;

use buddypool_abi::errno::{errno, set_errno};
use buddypool_abi::{
    btok, buddy_destroy, buddy_free, buddy_init, buddy_malloc, buddy_pool, buddy_realloc,
};
use buddypool_core::{HEADER_SIZE, MIN_K};

fn init(size: usize) -> buddy_pool {
    let mut pool = buddy_pool::zeroed();
    unsafe { buddy_init(&mut pool, size) };
    pool
}

#[test]
fn btok_boundaries() {
    assert_eq!(btok(63), 6);
    assert_eq!(btok(64), 6);
    assert_eq!(btok(65), 7);
    assert_eq!(btok(1 << 20), 20);
}

#[test]
fn init_fills_descriptor_for_every_order() {
    for k in MIN_K..=MIN_K + 4 {
        let mut pool = init(1 << k);
        assert_eq!(pool.kval_m, k);
        assert_eq!(pool.numbytes, 1 << k);
        assert!(!pool.base.is_null());
        unsafe { buddy_destroy(&mut pool) };
        assert_eq!(pool.kval_m, 0);
        assert_eq!(pool.numbytes, 0);
        assert!(pool.base.is_null());
    }
}

#[test]
fn small_size_is_raised_to_min_order() {
    let mut pool = init(1);
    assert_eq!(pool.kval_m, MIN_K);
    unsafe { buddy_destroy(&mut pool) };
}

#[test]
fn null_pool_and_zero_size_set_einval() {
    set_errno(0);
    assert!(unsafe { buddy_malloc(ptr::null_mut(), 64) }.is_null());
    assert_eq!(errno(), libc::EINVAL);

    let mut pool = init(1 << MIN_K);
    set_errno(0);
    assert!(unsafe { buddy_malloc(&mut pool, 0) }.is_null());
    assert_eq!(errno(), libc::EINVAL);
    unsafe { buddy_destroy(&mut pool) };
}

#[test]
fn null_arguments_are_ignored() {
    unsafe {
        buddy_init(ptr::null_mut(), 1 << MIN_K);
        buddy_free(ptr::null_mut(), ptr::null_mut());
        buddy_destroy(ptr::null_mut());
    }
    let mut pool = init(1 << MIN_K);
    unsafe {
        buddy_free(&mut pool, ptr::null_mut());
        buddy_destroy(&mut pool);
        // Second destroy sees a zeroed descriptor.
        buddy_destroy(&mut pool);
    }
}

#[test]
fn exhaustion_sets_enomem() {
    let mut pool = init(1 << MIN_K);
    let whole = unsafe { buddy_malloc(&mut pool, (1 << MIN_K) - HEADER_SIZE) };
    assert!(!whole.is_null());
    set_errno(0);
    assert!(unsafe { buddy_malloc(&mut pool, 5) }.is_null());
    assert_eq!(errno(), libc::ENOMEM);
    unsafe {
        buddy_free(&mut pool, whole);
        assert!(!buddy_malloc(&mut pool, 5).is_null());
        buddy_destroy(&mut pool);
    }
}

#[test]
fn buddy_pointers_for_equal_requests() {
    let mut pool = init(1 << MIN_K);
    unsafe {
        let a = buddy_malloc(&mut pool, 1).cast::<u8>();
        let b = buddy_malloc(&mut pool, 1).cast::<u8>();
        let base = pool.base as usize;
        let a_off = a as usize - HEADER_SIZE - base;
        let b_off = b as usize - HEADER_SIZE - base;
        assert_eq!(a_off ^ (1 << 6), b_off);
        buddy_free(&mut pool, a.cast());
        buddy_free(&mut pool, b.cast());
        buddy_destroy(&mut pool);
    }
}

#[test]
fn realloc_contract() {
    let mut pool = init(1 << MIN_K);
    unsafe {
        let p = buddy_realloc(&mut pool, ptr::null_mut(), 10).cast::<u8>();
        assert!(!p.is_null());
        for i in 0..10 {
            p.add(i).write(i as u8 + 1);
        }
        let q = buddy_realloc(&mut pool, p.cast::<c_void>(), 5000).cast::<u8>();
        assert!(!q.is_null());
        for i in 0..10 {
            assert_eq!(q.add(i).read(), i as u8 + 1);
        }

        set_errno(0);
        let huge = buddy_realloc(&mut pool, q.cast(), 1 << (MIN_K + 1));
        assert!(huge.is_null());
        assert_eq!(errno(), libc::ENOMEM);
        assert_eq!(q.read(), 1);

        assert!(buddy_realloc(&mut pool, q.cast(), 0).is_null());
        let whole = buddy_malloc(&mut pool, (1 << MIN_K) - HEADER_SIZE);
        assert!(!whole.is_null(), "zero-size realloc released the block");
        buddy_destroy(&mut pool);
    }
}

use std::sync::{Mutex, MutexGuard};

/// 加锁；持锁线程 panic 导致的中毒不影响位图/缓存这类纯数据，直接取回内部值
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 向上取整除法
pub const fn div_round_up(value: u32, divisor: u32) -> u32 {
    (value + divisor - 1) / divisor
}

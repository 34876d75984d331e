//! 発見した素数を受け取る側の抽象。
//!
//! エンジンは素数を厳密な昇順で 1 個ずつ渡してくる。受け取り側は
//! 呼び出しあたり償却 O(1) で処理を終え、セグメントループを
//! ブロックしないことが契約になっている。

use std::sync::atomic::{AtomicBool, Ordering};

use crate::engine_types::SieveResult;

/// 素数の受け取り先。ストリーミングモード（値そのもの）と
/// カウントモード（個数だけ）の両方をこの 1 つの契約で賄う。
pub trait PrimeSink {
    /// 次の素数を受け取る。値は前回より必ず大きい。
    fn prime(&mut self, p: u64) -> SieveResult<()>;

    /// すべての素数を渡し終えた（または停止した）ときに 1 回呼ばれる。
    fn finish(&mut self) -> SieveResult<()> {
        Ok(())
    }
}

/// 受け取った素数をそのままベクタへ蓄積する Sink。
#[derive(Default)]
pub struct CollectSink {
    primes: Vec<u64>,
}

impl CollectSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_primes(self) -> Vec<u64> {
        self.primes
    }
}

impl PrimeSink for CollectSink {
    fn prime(&mut self, p: u64) -> SieveResult<()> {
        self.primes.push(p);
        Ok(())
    }
}

/// 個数だけを保持する Sink。値は捨てる。
#[derive(Default)]
pub struct CountSink {
    count: u64,
}

impl CountSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> u64 {
        self.count
    }
}

impl PrimeSink for CountSink {
    fn prime(&mut self, _p: u64) -> SieveResult<()> {
        self.count += 1;
        Ok(())
    }
}

/// n 番目の素数を見つけたら停止フラグを立てる Sink。
///
/// フラグはセグメント粒度で確認されるため、発見後もしばらく素数が
/// 流れてくることがある。余分な値は単に無視する。
pub struct NthPrimeSink<'a> {
    target: u64,
    seen: u64,
    found: Option<u64>,
    stop_flag: &'a AtomicBool,
}

impl<'a> NthPrimeSink<'a> {
    pub fn new(target: u64, stop_flag: &'a AtomicBool) -> Self {
        Self {
            target,
            seen: 0,
            found: None,
            stop_flag,
        }
    }

    pub fn found(&self) -> Option<u64> {
        self.found
    }
}

impl PrimeSink for NthPrimeSink<'_> {
    fn prime(&mut self, p: u64) -> SieveResult<()> {
        if self.found.is_some() {
            return Ok(());
        }
        self.seen += 1;
        if self.seen == self.target {
            self.found = Some(p);
            self.stop_flag.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_sink_keeps_order() {
        let mut sink = CollectSink::new();
        for p in [2u64, 3, 5, 7] {
            sink.prime(p).unwrap();
        }
        assert_eq!(sink.into_primes(), vec![2, 3, 5, 7]);
    }

    #[test]
    fn nth_sink_trips_stop_flag() {
        let stop_flag = AtomicBool::new(false);
        let mut sink = NthPrimeSink::new(3, &stop_flag);
        for p in [2u64, 3, 5, 7, 11] {
            sink.prime(p).unwrap();
        }
        assert_eq!(sink.found(), Some(5));
        assert!(stop_flag.load(Ordering::SeqCst));
    }
}

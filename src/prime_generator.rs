//! 篩い素数のブートストラップ。
//!
//! 外側の篩が必要とする篩い素数、すなわち (プリシーブ上限, sqrt(stop)] の
//! すべての素数を供給する。範囲が小さければ単純な配列篩で直接求め、
//! 大きければ自分自身を一回り小さくした入れ子の篩（篩が篩を養う自己相似
//! 構造）で求める。再帰は sqrt を取るたびに急速に縮むため、実用上 2 段で
//! 配列篩に到達する。

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use bitvec::prelude::*;

use crate::config::{GENERATOR_SEGMENT_BYTES, PRESIEVE_MIN_PRIME, TINY_SIEVE_LIMIT};
use crate::engine_types::SieveResult;
use crate::pre_sieve::PreSieve;
use crate::segment_sieve::SegmentSieve;
use crate::sieve_math::integer_sqrt;
use crate::wheel;

/// `(min_exclusive, max_inclusive]` のすべての素数を昇順で `sink` に渡す。
///
/// `min_exclusive` はプリシーブ上限（7 以上）を想定している。2・3・5 など
/// それ以下の素数はホイールとプリシーブが処理するため、ここは関知しない。
///
/// 再帰呼び出しのたびに sink の型が入れ子になるのを避けるため、
/// sink はトレイトオブジェクトで受け取る。
pub fn generate_sieving_primes(
    min_exclusive: u64,
    max_inclusive: u64,
    stop_flag: &AtomicBool,
    sink: &mut dyn FnMut(u64) -> SieveResult<()>,
) -> SieveResult<()> {
    debug_assert!(min_exclusive >= PRESIEVE_MIN_PRIME);

    if max_inclusive <= min_exclusive {
        return Ok(());
    }
    if max_inclusive <= TINY_SIEVE_LIMIT {
        return tiny_sieve(min_exclusive, max_inclusive, sink);
    }

    // 入れ子の篩。自分の篩い素数は sqrt(max) までの再帰呼び出しで賄う。
    let pre = Arc::new(PreSieve::new(PRESIEVE_MIN_PRIME)?);
    let mut inner = SegmentSieve::new(
        min_exclusive + 1,
        max_inclusive,
        GENERATOR_SEGMENT_BYTES,
        pre,
        None,
    )?;

    let root = integer_sqrt(max_inclusive);
    if root > PRESIEVE_MIN_PRIME {
        generate_sieving_primes(PRESIEVE_MIN_PRIME, root, stop_flag, &mut |p| {
            inner.add_sieving_prime(p)
        })?;
    }

    // 完了したセグメントのビットを整数値へ復元し、そのまま消費側へ流す。
    let mut forward_err: Option<crate::engine_types::SieveError> = None;
    inner.run(stop_flag, |bytes, low| {
        wheel::decode_segment(bytes, low, &mut |n| {
            if forward_err.is_none() {
                if let Err(e) = sink(n) {
                    forward_err = Some(e);
                }
            }
        });
        match forward_err.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    })
}

/// 再帰の底: 奇数ストライドの単純な配列篩。
///
/// `i` の倍数を `i*i` から `2i` 刻みで消し、生き残った奇数のうち
/// `min_exclusive` より大きいものを登録する。
fn tiny_sieve(
    min_exclusive: u64,
    max_inclusive: u64,
    sink: &mut dyn FnMut(u64) -> SieveResult<()>,
) -> SieveResult<()> {
    let n = max_inclusive as usize;
    let mut is_prime = bitvec![1; n + 1];

    let mut i = 3usize;
    while i * i <= n {
        if is_prime[i] {
            let mut j = i * i;
            while j <= n {
                is_prime.set(j, false);
                j += 2 * i;
            }
        }
        i += 2;
    }

    let mut p = (min_exclusive + 1) as usize;
    if p % 2 == 0 {
        p += 1;
    }
    while p <= n {
        if is_prime[p] {
            sink(p as u64)?;
        }
        p += 2;
    }
    Ok(())
}

//! 分割エラトステネスの篩の中核。
//!
//! 1 つの `SegmentSieve` がセグメント 1 枚分のビットバッファを所有し、半開区間
//! `[low, high)` をセグメント幅ずつ前進しながら、登録された篩い素数の倍数を
//! 消し込んでいく。篩い素数は「1 セグメントに何個の倍数が落ちるか」で
//! Small / Medium / Big の 3 階層に振り分けられ、それぞれ別の戦略で処理される。
//!
//! - Small: 倍数が多数。素数ごとにホイールステップをセグメント末尾まで回す。
//! - Medium: 倍数は数個。コンパクトな配列をセグメントごとに 1 回走査する。
//! - Big: 倍数は稀。次の倍数が落ちるセグメント宛てのバケットに入れておき、
//!   そのセグメントの番が来たときだけコストを払う。登録済みの Big 素数全体を
//!   毎セグメント走査することはない。
//!
//! バッファとバケットはこのインスタンスの専有であり、スレッド間で共有される
//! 可変状態は存在しない。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{BUCKET_SIZE, BYTES_PER_ALLOC, FACTOR_MEDIUM, FACTOR_SMALL};
use crate::engine_types::{SieveError, SieveResult};
use crate::pre_sieve::PreSieve;
use crate::wheel::{self, NUMBERS_PER_BYTE, WHEEL_RESIDUES};

/// 篩い中の素数 1 個分の状態。
///
/// `multiple` は次に消し込む候補倍数（絶対値）、`wheel_index` はその倍数の
/// 商のホイール上の位置。セグメントを消化するたびに前進していく。
#[derive(Clone, Copy, Debug)]
struct WheelPrime {
    prime: u64,
    multiple: u64,
    wheel_index: u8,
}

impl WheelPrime {
    /// 次の候補倍数へ 1 ステップ進める。ステップ幅は商の残余だけで決まる。
    #[inline]
    fn advance(&mut self) {
        let s = wheel::WHEEL_STEPS[WHEEL_RESIDUES[self.wheel_index as usize] as usize];
        self.multiple += self.prime * s.gap as u64;
        self.wheel_index = s.next_index;
    }
}

/// 階層振り分けの閾値。通常はセグメントサイズから導出するが、テストでは
/// 全素数を特定の階層へ寄せて結果が変わらないことを検証するために差し替える。
#[derive(Clone, Copy, Debug)]
pub struct TierLimits {
    pub small: u64,
    pub medium: u64,
}

impl TierLimits {
    pub fn for_segment(segment_bytes: usize) -> Self {
        Self {
            small: (segment_bytes as f64 * FACTOR_SMALL) as u64,
            medium: (segment_bytes as f64 * FACTOR_MEDIUM) as u64,
        }
    }
}

/// Big 階層のバケット。容量は `BUCKET_SIZE` 固定。
struct Bucket {
    entries: Vec<WheelPrime>,
}

/// バケットのフリーリスト。枯渇したら `BYTES_PER_ALLOC` 分をまとめて確保する。
struct BucketPool {
    free: Vec<Bucket>,
}

impl BucketPool {
    fn new() -> Self {
        Self { free: Vec::new() }
    }

    fn take(&mut self) -> SieveResult<Bucket> {
        if self.free.is_empty() {
            let per_bucket = BUCKET_SIZE * std::mem::size_of::<WheelPrime>();
            let buckets = (BYTES_PER_ALLOC / per_bucket).max(1);
            self.free.try_reserve(buckets)?;
            for _ in 0..buckets {
                let mut entries = Vec::new();
                entries.try_reserve_exact(BUCKET_SIZE)?;
                self.free.push(Bucket { entries });
            }
        }
        // 直前で必ず補充しているため空にはならない
        Ok(self.free.pop().unwrap_or(Bucket {
            entries: Vec::new(),
        }))
    }

    fn recycle(&mut self, mut bucket: Bucket) {
        bucket.entries.clear();
        self.free.push(bucket);
    }
}

pub struct SegmentSieve {
    /// 現在のセグメント先頭（30 の倍数）。セグメントを消化するたびに前進する。
    low: u64,
    /// 区間の終端（30 の倍数、排他的）。
    high: u64,
    /// 呼び出し側が指定した区間の先頭（両端含む）。端のマスクに使う。
    start: u64,
    /// 呼び出し側が指定した区間の末尾（両端含む）。端のマスクに使う。
    stop: u64,
    /// セグメントバッファの実効サイズ（バイト）。
    segment_bytes: usize,
    sieve: Vec<u8>,
    pre_sieve: Arc<PreSieve>,
    limits: TierLimits,
    small: Vec<WheelPrime>,
    medium: Vec<WheelPrime>,
    /// インデックス d = 現在のセグメントから d 枚先のセグメント宛てのバケット列。
    buckets: VecDeque<Vec<Bucket>>,
    pool: BucketPool,
}

impl SegmentSieve {
    /// `[start, stop]`（両端含む）を `segment_bytes` 幅のセグメントで篩う
    /// インスタンスを作る。`limits` が None のときは実効セグメントサイズから
    /// 既定の階層閾値を導出する。
    pub fn new(
        start: u64,
        stop: u64,
        segment_bytes: usize,
        pre_sieve: Arc<PreSieve>,
        limits: Option<TierLimits>,
    ) -> SieveResult<Self> {
        if stop < start {
            return Err(SieveError::InvalidRange(format!(
                "stop ({stop}) must be >= start ({start})"
            )));
        }

        // セグメント境界はホイール 1 周期（30 整数 = 1 バイト）に揃える。
        // 区間端の半端は後でビットマスクとして処理する。
        let low = start - start % NUMBERS_PER_BYTE;
        let high = (stop / NUMBERS_PER_BYTE + 1) * NUMBERS_PER_BYTE;
        let total_bytes = ((high - low) / NUMBERS_PER_BYTE) as usize;
        let segment_bytes = segment_bytes.min(total_bytes).max(1);

        Ok(Self {
            low,
            high,
            start,
            stop,
            segment_bytes,
            sieve: vec![0u8; segment_bytes],
            pre_sieve,
            limits: limits.unwrap_or_else(|| TierLimits::for_segment(segment_bytes)),
            small: Vec::new(),
            medium: Vec::new(),
            buckets: VecDeque::new(),
            pool: BucketPool::new(),
        })
    }

    #[inline]
    fn span(&self) -> u64 {
        self.segment_bytes as u64 * NUMBERS_PER_BYTE
    }

    /// 篩い素数 p を登録する。p はプリシーブ上限より大きい素数であること。
    ///
    /// 最初に消し込む倍数は max(p*p, 区間先頭以上の最初の候補倍数)。それが
    /// 区間の外にある素数はどの階層にも入らない。p*p が 64bit に収まらない
    /// 場合は範囲エラー（呼び出し側の事前検証が守られていれば起こらない）。
    pub fn add_sieving_prime(&mut self, prime: u64) -> SieveResult<()> {
        debug_assert!(prime > self.pre_sieve.max_prime());

        if prime.checked_mul(prime).is_none() {
            return Err(SieveError::InvalidRange(format!(
                "sieving prime {prime} squared exceeds the 64-bit domain"
            )));
        }

        let quotient = wheel::next_candidate(prime.max(self.low.div_ceil(prime)));
        let multiple = match prime.checked_mul(quotient) {
            Some(m) if m < self.high => m,
            // 最初の倍数が区間外: この素数は消し込み対象を持たない
            _ => return Ok(()),
        };
        let entry = WheelPrime {
            prime,
            multiple,
            wheel_index: wheel::bit_index(quotient),
        };

        if prime <= self.limits.small {
            self.small.push(entry);
        } else if prime <= self.limits.medium {
            self.medium.push(entry);
        } else {
            self.push_bucket(self.low, entry)?;
        }
        Ok(())
    }

    /// `entry` を、次の倍数が落ちるセグメント宛てのバケットへ入れる。
    /// `base` はバケット列のインデックス 0 が指すセグメントの先頭。
    fn push_bucket(&mut self, base: u64, entry: WheelPrime) -> SieveResult<()> {
        let distance = ((entry.multiple - base) / self.span()) as usize;
        while self.buckets.len() <= distance {
            self.buckets.push_back(Vec::new());
        }
        let needs_new = self.buckets[distance]
            .last()
            .is_none_or(|b| b.entries.len() == BUCKET_SIZE);
        if needs_new {
            let bucket = self.pool.take()?;
            self.buckets[distance].push(bucket);
        }
        if let Some(bucket) = self.buckets[distance].last_mut() {
            bucket.entries.push(entry);
        }
        Ok(())
    }

    /// 区間が尽きるまでセグメントを前進させる。
    ///
    /// セグメントごとに: プリシーブパターンで初期化 -> 各階層の消し込み ->
    /// 区間端のマスク -> `segment_finished` 呼び出し、の順で処理する。
    /// 停止フラグはセグメント粒度で確認し、途中で立てられた場合は
    /// それまでに通知済みの結果を有効のまま静かに終了する。
    pub fn run<F>(&mut self, stop_flag: &AtomicBool, mut segment_finished: F) -> SieveResult<()>
    where
        F: FnMut(&[u8], u64) -> SieveResult<()>,
    {
        while self.low < self.high {
            if stop_flag.load(Ordering::SeqCst) {
                return Ok(());
            }

            let seg_high = (self.low + self.span()).min(self.high);
            let bytes = ((seg_high - self.low) / NUMBERS_PER_BYTE) as usize;

            self.pre_sieve.fill(&mut self.sieve[..bytes], self.low);
            self.cross_small(seg_high);
            self.cross_medium(seg_high);
            self.cross_big(seg_high)?;
            self.mask_bounds(bytes, seg_high);

            segment_finished(&self.sieve[..bytes], self.low)?;
            self.low = seg_high;
        }
        Ok(())
    }

    /// Small 階層: 素数ごとにホイールステップの密なループを回す。
    fn cross_small(&mut self, seg_high: u64) {
        let seg_low = self.low;
        let sieve = &mut self.sieve;
        for wp in self.small.iter_mut() {
            while wp.multiple < seg_high {
                let byte = ((wp.multiple - seg_low) / NUMBERS_PER_BYTE) as usize;
                sieve[byte] &= !(1 << wheel::bit_index(wp.multiple));
                wp.advance();
            }
        }
    }

    /// Medium 階層: 配列を 1 回走査し、このセグメントに倍数を持つ項目だけ
    /// 消し込む。大半の項目は先頭の比較 1 回で素通りする。
    fn cross_medium(&mut self, seg_high: u64) {
        let seg_low = self.low;
        let sieve = &mut self.sieve;
        for wp in self.medium.iter_mut() {
            if wp.multiple >= seg_high {
                continue;
            }
            while wp.multiple < seg_high {
                let byte = ((wp.multiple - seg_low) / NUMBERS_PER_BYTE) as usize;
                sieve[byte] &= !(1 << wheel::bit_index(wp.multiple));
                wp.advance();
            }
        }
    }

    /// Big 階層: このセグメント宛てのバケットだけを処理する。
    /// 消し込み後の素数は次の倍数が落ちるセグメント宛てに詰め直し、
    /// 空になったバケットはフリーリストへ返す。
    fn cross_big(&mut self, seg_high: u64) -> SieveResult<()> {
        let Some(mut due) = self.buckets.pop_front() else {
            return Ok(());
        };
        let seg_low = self.low;
        for mut bucket in due.drain(..) {
            while let Some(mut wp) = bucket.entries.pop() {
                while wp.multiple < seg_high {
                    let byte = ((wp.multiple - seg_low) / NUMBERS_PER_BYTE) as usize;
                    self.sieve[byte] &= !(1 << wheel::bit_index(wp.multiple));
                    wp.advance();
                }
                if wp.multiple < self.high {
                    // pop_front 済みなので次セグメント先頭 (= seg_high) が基準
                    self.push_bucket(seg_high, wp)?;
                }
            }
            self.pool.recycle(bucket);
        }
        Ok(())
    }

    /// 区間端の半端なバイトをマスクする。
    ///
    /// - 先頭: 区間開始より小さい値と、プリシーブ済み小素数そのもの
    ///   （直接出力されるため）のビットを落とす。
    /// - 末尾: stop を超える値のビットを落とす。
    fn mask_bounds(&mut self, bytes: usize, seg_high: u64) {
        let min_keep = self.start.max(self.pre_sieve.max_prime() + 1);
        if self.low < min_keep {
            let mut mask = 0xffu8;
            for (bit, &r) in WHEEL_RESIDUES.iter().enumerate() {
                if self.low + r < min_keep {
                    mask &= !(1 << bit);
                }
            }
            self.sieve[0] &= mask;
        }

        if self.stop < seg_high - 1 {
            let base = self.low + (bytes as u64 - 1) * NUMBERS_PER_BYTE;
            let mut mask = 0xffu8;
            for (bit, &r) in WHEEL_RESIDUES.iter().enumerate() {
                if base + r > self.stop {
                    mask &= !(1 << bit);
                }
            }
            self.sieve[bytes - 1] &= mask;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PRESIEVE_MIN_PRIME;
    use crate::prime_generator::generate_sieving_primes;
    use crate::sieve_math::integer_sqrt;

    /// 指定した階層閾値で [start, stop] を篩い、復元した素数列を返す。
    fn sieve_with_limits(
        start: u64,
        stop: u64,
        segment_bytes: usize,
        limits: Option<TierLimits>,
    ) -> Vec<u64> {
        let pre = Arc::new(PreSieve::new(PRESIEVE_MIN_PRIME).unwrap());
        let mut sieve =
            SegmentSieve::new(start, stop, segment_bytes, Arc::clone(&pre), limits).unwrap();

        let root = integer_sqrt(stop);
        let stop_flag = AtomicBool::new(false);
        if root > PRESIEVE_MIN_PRIME {
            generate_sieving_primes(PRESIEVE_MIN_PRIME, root, &stop_flag, &mut |p| {
                sieve.add_sieving_prime(p)
            })
            .unwrap();
        }

        let mut primes: Vec<u64> = wheel::BASE_PRIMES
            .iter()
            .copied()
            .filter(|&p| p <= PRESIEVE_MIN_PRIME && p >= start && p <= stop)
            .collect();
        sieve
            .run(&stop_flag, |bytes, low| {
                wheel::decode_segment(bytes, low, &mut |n| primes.push(n));
                Ok(())
            })
            .unwrap();
        primes
    }

    fn trial_division_primes(start: u64, stop: u64) -> Vec<u64> {
        (start.max(2)..=stop)
            .filter(|&n| {
                let mut d = 2u64;
                while d * d <= n {
                    if n % d == 0 {
                        return false;
                    }
                    d += 1;
                }
                true
            })
            .collect()
    }

    #[test]
    fn matches_trial_division_on_offset_range() {
        let expected = trial_division_primes(9_990, 10_530);
        assert_eq!(sieve_with_limits(9_990, 10_530, 4, None), expected);
    }

    /// 階層分けは純粋な最適化であり、どの階層に寄せても結果は変わらない。
    #[test]
    fn tier_assignment_does_not_change_results() {
        let start = 1_000_000u64;
        let stop = 1_030_000u64;
        let segment_bytes = 256;

        let all_small = TierLimits {
            small: u64::MAX,
            medium: u64::MAX,
        };
        let all_medium = TierLimits {
            small: 0,
            medium: u64::MAX,
        };
        let all_big = TierLimits {
            small: 0,
            medium: 0,
        };

        let expected = sieve_with_limits(start, stop, segment_bytes, None);
        assert_eq!(
            sieve_with_limits(start, stop, segment_bytes, Some(all_small)),
            expected
        );
        assert_eq!(
            sieve_with_limits(start, stop, segment_bytes, Some(all_medium)),
            expected
        );
        assert_eq!(
            sieve_with_limits(start, stop, segment_bytes, Some(all_big)),
            expected
        );
        assert_eq!(expected, trial_division_primes(start, stop));
    }

    /// セグメントを 2 回復元しても同じ素数列が得られる（復号は冪等）。
    #[test]
    fn decoding_is_idempotent() {
        let pre = Arc::new(PreSieve::new(PRESIEVE_MIN_PRIME).unwrap());
        let mut sieve = SegmentSieve::new(100, 1_000, 8, pre, None).unwrap();
        let stop_flag = AtomicBool::new(false);
        generate_sieving_primes(PRESIEVE_MIN_PRIME, integer_sqrt(1_000), &stop_flag, &mut |p| {
            sieve.add_sieving_prime(p)
        })
        .unwrap();

        let mut first = Vec::new();
        let mut second = Vec::new();
        sieve
            .run(&stop_flag, |bytes, low| {
                wheel::decode_segment(bytes, low, &mut |n| first.push(n));
                wheel::decode_segment(bytes, low, &mut |n| second.push(n));
                Ok(())
            })
            .unwrap();
        assert_eq!(first, second);
    }

    /// 停止フラグを立てると以降のセグメントは処理されない。
    #[test]
    fn stop_flag_aborts_between_segments() {
        let pre = Arc::new(PreSieve::new(PRESIEVE_MIN_PRIME).unwrap());
        let mut sieve = SegmentSieve::new(0, 100_000, 64, pre, None).unwrap();
        let stop_flag = AtomicBool::new(false);
        generate_sieving_primes(
            PRESIEVE_MIN_PRIME,
            integer_sqrt(100_000),
            &stop_flag,
            &mut |p| sieve.add_sieving_prime(p),
        )
        .unwrap();

        let mut segments = 0;
        sieve
            .run(&stop_flag, |_, _| {
                segments += 1;
                stop_flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();
        assert_eq!(segments, 1);
    }
}

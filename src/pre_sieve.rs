//! 小素数の倍数を先に消し込んだ繰り返しパターン。
//!
//! 上限以下の素数すべての積を周期とするホイール 30 詰めのバイト列を 1 度だけ
//! 構築しておき、各セグメントの先頭でこのパターンを回転コピーする。これにより
//! 7〜上限の小素数をセグメントごとに消し込むコストが 1 回のメモリコピーに置き
//! 換わる。パターンは構築後は不変で、全スレッドから読み取り専用で共有される。
//!
//! メモリ使用量は 周期 / 30 バイト:
//! - 上限  7 ->    7 バイト
//! - 上限 13 -> 1001 バイト
//! - 上限 19 -> 約 323 KB
//! - 上限 23 -> 約 7.4 MB

use crate::engine_types::SieveResult;
use crate::sieve_math::simple_sieve;
use crate::wheel::{self, NUMBERS_PER_BYTE};

pub struct PreSieve {
    /// パターンに含まれる最大の素数。
    max_prime: u64,
    /// 上限以下の素数すべての積（= パターンの周期）。
    prime_product: u64,
    /// ホイール 30 詰めのパターン本体。長さは prime_product / 30。
    pattern: Vec<u8>,
}

impl PreSieve {
    /// `limit` 以下の素数の倍数を消し込んだパターンを構築する。
    pub fn new(limit: u64) -> SieveResult<Self> {
        let small_primes = simple_sieve(limit)?;
        let prime_product: u64 = small_primes.iter().product();
        let max_prime = small_primes.last().copied().unwrap_or(1);
        let len = (prime_product / NUMBERS_PER_BYTE) as usize;
        let mut pattern = vec![0xffu8; len];

        // 2・3・5 はホイールの表現自体に含まれないため、7 以上だけ消し込む。
        for &p in small_primes.iter().filter(|&&p| p > 5) {
            let mut quotient = 1u64;
            loop {
                let multiple = p * quotient;
                if multiple >= prime_product {
                    break;
                }
                let byte = (multiple / NUMBERS_PER_BYTE) as usize;
                let bit = wheel::bit_index(multiple);
                pattern[byte] &= !(1 << bit);

                let s = wheel::WHEEL_STEPS[(quotient % NUMBERS_PER_BYTE) as usize];
                quotient += s.gap as u64;
            }
        }

        Ok(Self {
            max_prime,
            prime_product,
            pattern,
        })
    }

    /// パターンに含まれる最大の素数。この値以下の素数は篩い素数として登録されない。
    pub fn max_prime(&self) -> u64 {
        self.max_prime
    }

    /// パターンの周期。
    pub fn prime_product(&self) -> u64 {
        self.prime_product
    }

    /// `low` から始まるセグメントバッファへ、正しく回転させたパターンを書き込む。
    /// `low` は 30 の倍数でなければならない。
    pub fn fill(&self, target: &mut [u8], low: u64) {
        debug_assert!(low % NUMBERS_PER_BYTE == 0);
        let len = self.pattern.len();
        let mut offset = ((low / NUMBERS_PER_BYTE) % len as u64) as usize;
        let mut filled = 0;
        while filled < target.len() {
            let n = (target.len() - filled).min(len - offset);
            target[filled..filled + n].copy_from_slice(&self.pattern[offset..offset + n]);
            filled += n;
            offset = 0;
        }
    }
}

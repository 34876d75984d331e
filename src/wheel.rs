//! mod 30 ホイールのビット配置と残余テーブル。
//!
//! 1 バイトが連続する 30 個の整数を表し、30 と互いに素な 8 つの残余
//! {1, 7, 11, 13, 17, 19, 23, 29} だけをビットとして保持する。
//! それ以外の残余は 2・3・5 の倍数なので表現自体を持たない。
//! ビットが立っている = まだ合成数と証明されていない候補。

/// 1 バイトが表す整数の個数。
pub const NUMBERS_PER_BYTE: u64 = 30;

/// ビット位置から mod 30 残余へのマッピング。
pub const WHEEL_RESIDUES: [u64; 8] = [1, 7, 11, 13, 17, 19, 23, 29];

/// mod 30 での余りからビット位置へのマッピング。
/// 候補でない数は 255 を返す。
pub const RESIDUE_TO_BIT: [u8; 30] = [
    255, 0, 255, 255, 255, 255, 255, 1, // 0-7
    255, 255, 255, 2, 255, 3, 255, 255, // 8-15
    255, 4, 255, 5, 255, 255, 255, 6, // 16-23
    255, 255, 255, 255, 255, 7, // 24-29
];

/// ホイール 1 ステップ分の遷移。
///
/// 篩い素数 p の倍数 p*q（q はホイール候補）を消し込んだ後、次の候補倍数は
/// p*(q + gap) になる。`gap` は q の残余だけで決まり、素数の値には依存しない。
/// `next_index` は遷移後の q の残余に対応するビット位置。
#[derive(Clone, Copy, Debug)]
pub struct WheelStep {
    pub gap: u8,
    pub next_index: u8,
}

const NO_STEP: WheelStep = WheelStep {
    gap: 0,
    next_index: 255,
};

const fn step(gap: u8, next_index: u8) -> WheelStep {
    WheelStep { gap, next_index }
}

/// 現在の残余で引くステップテーブル（30 エントリ）。候補でない残余は番兵。
pub const WHEEL_STEPS: [WheelStep; 30] = [
    NO_STEP,
    step(6, 1), // 1 -> 7
    NO_STEP,
    NO_STEP,
    NO_STEP,
    NO_STEP,
    NO_STEP,
    step(4, 2), // 7 -> 11
    NO_STEP,
    NO_STEP,
    NO_STEP,
    step(2, 3), // 11 -> 13
    NO_STEP,
    step(4, 4), // 13 -> 17
    NO_STEP,
    NO_STEP,
    NO_STEP,
    step(2, 5), // 17 -> 19
    NO_STEP,
    step(4, 6), // 19 -> 23
    NO_STEP,
    NO_STEP,
    NO_STEP,
    step(6, 7), // 23 -> 29
    NO_STEP,
    NO_STEP,
    NO_STEP,
    NO_STEP,
    NO_STEP,
    step(2, 0), // 29 -> 31
];

/// n 以上で最小のホイール候補までの距離。
const CANDIDATE_DELTA: [u64; 30] = [
    1, 0, 5, 4, 3, 2, 1, 0, 3, 2, 1, 0, 1, 0, 3, 2, 1, 0, 1, 0, 3, 2, 1, 0, 5, 4, 3, 2, 1, 0,
];

/// n 以上で最小のホイール候補を返す。
pub fn next_candidate(n: u64) -> u64 {
    n + CANDIDATE_DELTA[(n % NUMBERS_PER_BYTE) as usize]
}

/// ホイール候補 n のビット位置。候補でない n に対しては 255。
pub fn bit_index(n: u64) -> u8 {
    RESIDUE_TO_BIT[(n % NUMBERS_PER_BYTE) as usize]
}

/// ホイールで表現されない素数 2・3・5 と、プリシーブ対象になり得る小素数。
/// これらは篩い素数として登録されず、範囲に含まれていれば直接出力される。
pub const BASE_PRIMES: [u64; 9] = [2, 3, 5, 7, 11, 13, 17, 19, 23];

/// セグメントの立っているビットを整数値へ復元してコールバックに渡す。
///
/// `seg_low` はセグメント先頭バイトが表す 30 整数ブロックの先頭値で、
/// 30 の倍数でなければならない。出力は昇順。
pub fn decode_segment(sieve: &[u8], seg_low: u64, emit: &mut impl FnMut(u64)) {
    debug_assert!(seg_low % NUMBERS_PER_BYTE == 0);
    for (i, &byte) in sieve.iter().enumerate() {
        let base = seg_low + i as u64 * NUMBERS_PER_BYTE;
        let mut bits = byte;
        while bits != 0 {
            let b = bits.trailing_zeros() as usize;
            emit(base + WHEEL_RESIDUES[b]);
            bits &= bits - 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residue_tables_are_inverse() {
        for (bit, &r) in WHEEL_RESIDUES.iter().enumerate() {
            assert_eq!(RESIDUE_TO_BIT[r as usize] as usize, bit);
        }
        let candidates = RESIDUE_TO_BIT.iter().filter(|&&b| b != 255).count();
        assert_eq!(candidates, 8);
    }

    #[test]
    fn wheel_steps_walk_all_candidates() {
        // 残余 1 から 1 周すると 8 候補を巡って 31 (= 次の周期の 1) に着く。
        let mut value = 1u64;
        let mut index = 0u8;
        for _ in 0..8 {
            let s = WHEEL_STEPS[(value % 30) as usize];
            assert_ne!(s.next_index, 255);
            value += s.gap as u64;
            index = s.next_index;
            assert_eq!(bit_index(value), index);
        }
        assert_eq!(value, 31);
        assert_eq!(index, 0);
    }

    #[test]
    fn next_candidate_snaps_upward() {
        assert_eq!(next_candidate(0), 1);
        assert_eq!(next_candidate(1), 1);
        assert_eq!(next_candidate(2), 7);
        assert_eq!(next_candidate(24), 29);
        assert_eq!(next_candidate(30), 31);
        for n in 0..300u64 {
            let c = next_candidate(n);
            assert!(c >= n);
            assert_ne!(bit_index(c), 255);
            // c より小さい候補が n 以上に存在しないこと
            for m in n..c {
                assert_eq!(bit_index(m), 255);
            }
        }
    }

    #[test]
    fn decode_full_byte_yields_residues() {
        let mut out = Vec::new();
        decode_segment(&[0xff], 0, &mut |n| out.push(n));
        assert_eq!(out, vec![1, 7, 11, 13, 17, 19, 23, 29]);

        out.clear();
        decode_segment(&[0x00, 0b0000_0010], 30, &mut |n| out.push(n));
        assert_eq!(out, vec![67]); // 60 + 7
    }
}

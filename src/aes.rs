//! FIPS-197 AES block cipher: ECB, CBC, and CCM-decrypt.
//!
//! Grounded on `libcaes_context.c`/`libcaes_crypt.c`: a software key
//! schedule (no OS crypto provider) producing a fixed round-key array, with
//! ECB/CBC built on top of it and CCM decrypt implemented as the
//! counter-mode keystream construction EWFX actually uses.
//!
//! The S-box and its inverse are derived once over GF(2^8) (polynomial
//! `x^8 + x^4 + x^3 + x + 1`) and cached process-wide via [`std::sync::OnceLock`],
//! matching the "one justifiable process-wide datum" call-out in the design
//! notes.

use crate::error::{EwfError, Result};
use std::sync::OnceLock;

const BLOCK_SIZE: usize = 16;
const NB: usize = 4;

struct Tables {
    sbox: [u8; 256],
    inv_sbox: [u8; 256],
    rcon: [u8; 15],
}

fn xtime(a: u8) -> u8 {
    let hi = a & 0x80 != 0;
    let shifted = a.wrapping_shl(1);
    if hi {
        shifted ^ 0x1b
    } else {
        shifted
    }
}

fn gmul(mut a: u8, mut b: u8) -> u8 {
    let mut p: u8 = 0;
    for _ in 0..8 {
        if b & 1 != 0 {
            p ^= a;
        }
        let hi = a & 0x80 != 0;
        a <<= 1;
        if hi {
            a ^= 0x1b;
        }
        b >>= 1;
    }
    p
}

fn build_tables() -> Tables {
    // Multiplicative inverse over GF(2^8) via brute force (256 entries),
    // then the AES affine transform, gives the forward S-box.
    let mut sbox = [0u8; 256];
    let mut inv = [0u8; 256];
    // inverse table: inv[a] * a == 1 in GF(2^8), inv[0] = 0
    let mut mulinv = [0u8; 256];
    for a in 1..256usize {
        for b in 1..256usize {
            if gmul(a as u8, b as u8) == 1 {
                mulinv[a] = b as u8;
                break;
            }
        }
    }
    for i in 0..256usize {
        let b = mulinv[i];
        let mut rot = b;
        let mut acc = b;
        for _ in 0..4 {
            rot = rot.rotate_left(1);
            acc ^= rot;
        }
        sbox[i] = acc ^ 0x63;
    }
    for i in 0..256 {
        inv[sbox[i] as usize] = i as u8;
    }
    let mut rcon = [0u8; 15];
    rcon[0] = 0x01;
    for i in 1..15 {
        rcon[i] = xtime(rcon[i - 1]);
    }
    Tables {
        sbox,
        inv_sbox: inv,
        rcon,
    }
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(build_tables)
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KeyDirection {
    Encrypt,
    Decrypt,
}

/// A keyed AES context. Holds the expanded round-key schedule for one
/// direction (encrypt or decrypt) and one key size.
pub struct Aes {
    round_keys: Vec<[u8; 4]>,
    nr: usize,
    direction: KeyDirection,
}

impl Aes {
    /// `key.len()` must be 16, 24 or 32 bytes (128/192/256 bits).
    pub fn new(direction: KeyDirection, key: &[u8]) -> Result<Self> {
        let nk = match key.len() {
            16 => 4,
            24 => 6,
            32 => 8,
            other => return Err(EwfError::UnsupportedKeySize(other * 8)),
        };
        let nr = nk + 6;
        let round_keys = key_expansion(key, nk, nr);
        Ok(Self {
            round_keys,
            nr,
            direction,
        })
    }

    pub fn new_encrypt(key: &[u8]) -> Result<Self> {
        Self::new(KeyDirection::Encrypt, key)
    }

    pub fn new_decrypt(key: &[u8]) -> Result<Self> {
        Self::new(KeyDirection::Decrypt, key)
    }

    /// Encrypt or decrypt exactly one 16-byte block in place, per the
    /// direction the context was created with.
    pub fn ecb_block(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() != BLOCK_SIZE || output.len() != BLOCK_SIZE {
            return Err(EwfError::LengthNotMultipleOfBlock(input.len()));
        }
        match self.direction {
            KeyDirection::Encrypt => encrypt_block(input, output, &self.round_keys, self.nr),
            KeyDirection::Decrypt => decrypt_block(input, output, &self.round_keys, self.nr),
        }
        Ok(())
    }

    /// ECB over an arbitrary multiple-of-16-byte buffer.
    pub fn ecb(&self, input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() % BLOCK_SIZE != 0 || input.is_empty() || input.len() != output.len() {
            return Err(EwfError::LengthNotMultipleOfBlock(input.len()));
        }
        for (chunk_in, chunk_out) in input
            .chunks_exact(BLOCK_SIZE)
            .zip(output.chunks_exact_mut(BLOCK_SIZE))
        {
            self.ecb_block(chunk_in, chunk_out)?;
        }
        Ok(())
    }

    /// CBC over an arbitrary multiple-of-16-byte buffer.
    pub fn cbc(&self, iv: &[u8; 16], input: &[u8], output: &mut [u8]) -> Result<()> {
        if input.len() % BLOCK_SIZE != 0 || input.is_empty() || input.len() != output.len() {
            return Err(EwfError::LengthNotMultipleOfBlock(input.len()));
        }
        let mut prev = *iv;
        match self.direction {
            KeyDirection::Encrypt => {
                for (chunk_in, chunk_out) in input
                    .chunks_exact(BLOCK_SIZE)
                    .zip(output.chunks_exact_mut(BLOCK_SIZE))
                {
                    let mut xored = [0u8; BLOCK_SIZE];
                    for i in 0..BLOCK_SIZE {
                        xored[i] = chunk_in[i] ^ prev[i];
                    }
                    let mut block_out = [0u8; BLOCK_SIZE];
                    encrypt_block(&xored, &mut block_out, &self.round_keys, self.nr);
                    chunk_out.copy_from_slice(&block_out);
                    prev = block_out;
                }
            }
            KeyDirection::Decrypt => {
                for (chunk_in, chunk_out) in input
                    .chunks_exact(BLOCK_SIZE)
                    .zip(output.chunks_exact_mut(BLOCK_SIZE))
                {
                    let mut block_out = [0u8; BLOCK_SIZE];
                    decrypt_block(chunk_in, &mut block_out, &self.round_keys, self.nr);
                    for i in 0..BLOCK_SIZE {
                        block_out[i] ^= prev[i];
                    }
                    chunk_out.copy_from_slice(&block_out);
                    prev.copy_from_slice(chunk_in);
                }
            }
        }
        Ok(())
    }

    /// CCM decrypt in the counter-mode keystream form EWFX uses: the IV
    /// buffer's byte 0 is `15 - iv_len - 1`, bytes `1..=iv_len` carry the
    /// caller's IV, bytes `iv_len+1..=14` are zero, and byte 15 is a
    /// counter incremented (mod 256) per 16-byte keystream block. This
    /// context must have been constructed with [`KeyDirection::Encrypt`]:
    /// CCM keystream generation always runs the forward cipher, even when
    /// decrypting the ciphertext.
    pub fn ccm_decrypt(&self, iv: &[u8], input: &[u8], output: &mut [u8]) -> Result<()> {
        if iv.is_empty() || iv.len() > 14 {
            return Err(EwfError::IvTooLong(iv.len()));
        }
        if input.len() != output.len() {
            return Err(EwfError::InvalidArgument(
                "input/output length mismatch".into(),
            ));
        }
        if self.direction != KeyDirection::Encrypt {
            return Err(EwfError::InvalidArgument(
                "CCM keystream requires an encrypt-direction context".into(),
            ));
        }
        let mut block = [0u8; BLOCK_SIZE];
        block[0] = (15 - iv.len() - 1) as u8;
        block[1..1 + iv.len()].copy_from_slice(iv);

        let mut counter: u8 = 0;
        let mut offset = 0usize;
        while offset < input.len() {
            block[15] = counter;
            let mut keystream = [0u8; BLOCK_SIZE];
            encrypt_block(&block, &mut keystream, &self.round_keys, self.nr);
            let n = std::cmp::min(BLOCK_SIZE, input.len() - offset);
            for i in 0..n {
                output[offset + i] = input[offset + i] ^ keystream[i];
            }
            offset += n;
            counter = counter.wrapping_add(1);
        }
        Ok(())
    }
}

fn sub_word(w: [u8; 4]) -> [u8; 4] {
    let t = tables();
    [
        t.sbox[w[0] as usize],
        t.sbox[w[1] as usize],
        t.sbox[w[2] as usize],
        t.sbox[w[3] as usize],
    ]
}

fn rot_word(w: [u8; 4]) -> [u8; 4] {
    [w[1], w[2], w[3], w[0]]
}

fn xor_word(a: [u8; 4], b: [u8; 4]) -> [u8; 4] {
    [a[0] ^ b[0], a[1] ^ b[1], a[2] ^ b[2], a[3] ^ b[3]]
}

fn key_expansion(key: &[u8], nk: usize, nr: usize) -> Vec<[u8; 4]> {
    let t = tables();
    let total_words = NB * (nr + 1);
    let mut w: Vec<[u8; 4]> = Vec::with_capacity(total_words);
    for i in 0..nk {
        w.push([key[4 * i], key[4 * i + 1], key[4 * i + 2], key[4 * i + 3]]);
    }
    for i in nk..total_words {
        let mut temp = w[i - 1];
        if i % nk == 0 {
            temp = sub_word(rot_word(temp));
            temp[0] ^= t.rcon[i / nk - 1];
        } else if nk > 6 && i % nk == 4 {
            temp = sub_word(temp);
        }
        w.push(xor_word(w[i - nk], temp));
    }
    w
}

fn add_round_key(state: &mut [u8; 16], round_keys: &[[u8; 4]], round: usize) {
    for c in 0..4 {
        let word = round_keys[round * 4 + c];
        for r in 0..4 {
            state[r + 4 * c] ^= word[r];
        }
    }
}

fn sub_bytes(state: &mut [u8; 16]) {
    let t = tables();
    for b in state.iter_mut() {
        *b = t.sbox[*b as usize];
    }
}

fn inv_sub_bytes(state: &mut [u8; 16]) {
    let t = tables();
    for b in state.iter_mut() {
        *b = t.inv_sbox[*b as usize];
    }
}

fn shift_rows(state: &mut [u8; 16]) {
    // state is column-major: state[r + 4*c]
    let orig = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[r + 4 * c] = orig[r + 4 * ((c + r) % 4)];
        }
    }
}

fn inv_shift_rows(state: &mut [u8; 16]) {
    let orig = *state;
    for r in 1..4 {
        for c in 0..4 {
            state[r + 4 * ((c + r) % 4)] = orig[r + 4 * c];
        }
    }
}

fn mix_columns(state: &mut [u8; 16]) {
    for c in 0..4 {
        let col = [
            state[4 * c],
            state[4 * c + 1],
            state[4 * c + 2],
            state[4 * c + 3],
        ];
        state[4 * c] = gmul(col[0], 2) ^ gmul(col[1], 3) ^ col[2] ^ col[3];
        state[4 * c + 1] = col[0] ^ gmul(col[1], 2) ^ gmul(col[2], 3) ^ col[3];
        state[4 * c + 2] = col[0] ^ col[1] ^ gmul(col[2], 2) ^ gmul(col[3], 3);
        state[4 * c + 3] = gmul(col[0], 3) ^ col[1] ^ col[2] ^ gmul(col[3], 2);
    }
}

fn inv_mix_columns(state: &mut [u8; 16]) {
    for c in 0..4 {
        let col = [
            state[4 * c],
            state[4 * c + 1],
            state[4 * c + 2],
            state[4 * c + 3],
        ];
        state[4 * c] = gmul(col[0], 14) ^ gmul(col[1], 11) ^ gmul(col[2], 13) ^ gmul(col[3], 9);
        state[4 * c + 1] = gmul(col[0], 9) ^ gmul(col[1], 14) ^ gmul(col[2], 11) ^ gmul(col[3], 13);
        state[4 * c + 2] = gmul(col[0], 13) ^ gmul(col[1], 9) ^ gmul(col[2], 14) ^ gmul(col[3], 11);
        state[4 * c + 3] = gmul(col[0], 11) ^ gmul(col[1], 13) ^ gmul(col[2], 9) ^ gmul(col[3], 14);
    }
}

fn encrypt_block(input: &[u8], output: &mut [u8], round_keys: &[[u8; 4]], nr: usize) {
    let mut state = [0u8; 16];
    state.copy_from_slice(input);

    add_round_key(&mut state, round_keys, 0);
    for round in 1..nr {
        sub_bytes(&mut state);
        shift_rows(&mut state);
        mix_columns(&mut state);
        add_round_key(&mut state, round_keys, round);
    }
    sub_bytes(&mut state);
    shift_rows(&mut state);
    add_round_key(&mut state, round_keys, nr);

    output.copy_from_slice(&state);
}

fn decrypt_block(input: &[u8], output: &mut [u8], round_keys: &[[u8; 4]], nr: usize) {
    let mut state = [0u8; 16];
    state.copy_from_slice(input);

    add_round_key(&mut state, round_keys, nr);
    for round in (1..nr).rev() {
        inv_shift_rows(&mut state);
        inv_sub_bytes(&mut state);
        add_round_key(&mut state, round_keys, round);
        inv_mix_columns(&mut state);
    }
    inv_shift_rows(&mut state);
    inv_sub_bytes(&mut state);
    add_round_key(&mut state, round_keys, 0);

    output.copy_from_slice(&state);
}

#[cfg(test)]
mod tests {
    use super::*;

    // FIPS-197 Appendix B known-answer test.
    const FIPS197_KEY: [u8; 16] = [
        0x2b, 0x7e, 0x15, 0x16, 0x28, 0xae, 0xd2, 0xa6, 0xab, 0xf7, 0x15, 0x88, 0x09, 0xcf, 0x4f,
        0x3c,
    ];
    const FIPS197_PLAINTEXT: [u8; 16] = [
        0x32, 0x43, 0xf6, 0xa8, 0x88, 0x5a, 0x30, 0x8d, 0x31, 0x31, 0x98, 0xa2, 0xe0, 0x37, 0x07,
        0x34,
    ];
    const FIPS197_CIPHERTEXT: [u8; 16] = [
        0x39, 0x25, 0x84, 0x1d, 0x02, 0xdc, 0x09, 0xfb, 0xdc, 0x11, 0x85, 0x97, 0x19, 0x6a, 0x0b,
        0x32,
    ];

    #[test]
    fn fips197_ecb_known_answer() {
        let enc = Aes::new_encrypt(&FIPS197_KEY).unwrap();
        let mut out = [0u8; 16];
        enc.ecb_block(&FIPS197_PLAINTEXT, &mut out).unwrap();
        assert_eq!(out, FIPS197_CIPHERTEXT);

        let dec = Aes::new_decrypt(&FIPS197_KEY).unwrap();
        let mut back = [0u8; 16];
        dec.ecb_block(&out, &mut back).unwrap();
        assert_eq!(back, FIPS197_PLAINTEXT);
    }

    #[test]
    fn ecb_roundtrip_all_key_sizes() {
        for key_len in [16usize, 24, 32] {
            let key: Vec<u8> = (0..key_len as u8).collect();
            let enc = Aes::new_encrypt(&key).unwrap();
            let dec = Aes::new_decrypt(&key).unwrap();
            let plaintext = [0x11u8; 16];
            let mut ct = [0u8; 16];
            enc.ecb_block(&plaintext, &mut ct).unwrap();
            let mut pt = [0u8; 16];
            dec.ecb_block(&ct, &mut pt).unwrap();
            assert_eq!(pt, plaintext);
        }
    }

    #[test]
    fn cbc_roundtrip() {
        let key = [0x42u8; 16];
        let iv = [0x24u8; 16];
        let enc = Aes::new_encrypt(&key).unwrap();
        let dec = Aes::new_decrypt(&key).unwrap();
        let plaintext: Vec<u8> = (0..64u8).collect();
        let mut ct = vec![0u8; plaintext.len()];
        enc.cbc(&iv, &plaintext, &mut ct).unwrap();
        let mut pt = vec![0u8; plaintext.len()];
        dec.cbc(&iv, &ct, &mut pt).unwrap();
        assert_eq!(pt, plaintext);
    }

    #[test]
    fn cbc_rejects_non_block_multiple() {
        let key = [0u8; 16];
        let enc = Aes::new_encrypt(&key).unwrap();
        let iv = [0u8; 16];
        let input = [0u8; 5];
        let mut out = [0u8; 5];
        assert!(enc.cbc(&iv, &input, &mut out).is_err());
    }

    #[test]
    fn unsupported_key_size_is_rejected() {
        let err = Aes::new_encrypt(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, EwfError::UnsupportedKeySize(80)));
    }

    #[test]
    fn ccm_keystream_is_symmetric() {
        // Encrypting the keystream XOR twice returns the original value,
        // which is the property CCM's counter-mode keystream relies on.
        let key = [0x5au8; 16];
        let ctx = Aes::new_encrypt(&key).unwrap();
        let iv = [0x01, 0x02, 0x03, 0x04, 0x05];
        let plaintext: Vec<u8> = (0..40u8).collect();
        let mut ciphertext = vec![0u8; plaintext.len()];
        ctx.ccm_decrypt(&iv, &plaintext, &mut ciphertext).unwrap();
        let mut roundtrip = vec![0u8; plaintext.len()];
        ctx.ccm_decrypt(&iv, &ciphertext, &mut roundtrip).unwrap();
        assert_eq!(roundtrip, plaintext);
    }

    #[test]
    fn ccm_iv_too_long_is_rejected() {
        let key = [0u8; 16];
        let ctx = Aes::new_encrypt(&key).unwrap();
        let iv = [0u8; 15];
        let mut out = [0u8; 16];
        assert!(ctx.ccm_decrypt(&iv, &[0u8; 16], &mut out).is_err());
    }
}

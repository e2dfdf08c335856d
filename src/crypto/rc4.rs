//! RC4 stream cipher.
//!
//! Used by the standard security handler for V1/V2 documents (and V4 crypt
//! filters declaring `/CFM /V2`). Weak by modern standards but required for
//! the installed base. Encryption and decryption are the same operation.

/// RC4 state.
struct Rc4 {
    s: [u8; 256],
    i: u8,
    j: u8,
}

impl Rc4 {
    fn new(key: &[u8]) -> Self {
        debug_assert!(!key.is_empty());
        let mut s = [0u8; 256];
        for (i, slot) in s.iter_mut().enumerate() {
            *slot = i as u8;
        }
        let mut j = 0u8;
        for i in 0..256 {
            j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
            s.swap(i, j as usize);
        }
        Self { s, i: 0, j: 0 }
    }

    fn next_byte(&mut self) -> u8 {
        self.i = self.i.wrapping_add(1);
        self.j = self.j.wrapping_add(self.s[self.i as usize]);
        self.s.swap(self.i as usize, self.j as usize);
        let k = self.s[self.i as usize].wrapping_add(self.s[self.j as usize]);
        self.s[k as usize]
    }
}

/// Apply RC4 with `key` over `data`.
pub fn rc4_apply(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut cipher = Rc4::new(key);
    data.iter().map(|&b| b ^ cipher.next_byte()).collect()
}

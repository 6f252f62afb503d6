use std::fmt::{Debug, Display, Formatter, LowerHex};
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use utils::configuration_utils::FromStrParseable;

use crate::constants::RANDOM_POLYNOMIAL_MAX_TRIES;
use crate::ChunkingError;

/// A polynomial over GF(2), bit `i` being the coefficient of `x^i`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Pol(u64);

impl Pol {
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Degree of the polynomial; -1 for the zero polynomial.
    pub fn deg(&self) -> i32 {
        if self.0 == 0 {
            -1
        } else {
            63 - self.0.leading_zeros() as i32
        }
    }

    fn add(self, other: Pol) -> Pol {
        Pol(self.0 ^ other.0)
    }

    /// Remainder of the division by `d`.
    ///
    /// Panics if `d` is zero.
    pub fn modulo(self, d: Pol) -> Pol {
        assert!(d.0 != 0, "polynomial division by zero");

        let mut x = self;
        let d_deg = d.deg();
        while x.0 != 0 && x.deg() >= d_deg {
            x = Pol(x.0 ^ (d.0 << (x.deg() - d_deg)));
        }
        x
    }

    /// `self * f mod g`, with `self` already reduced modulo `g`.
    fn mul_mod(self, f: Pol, g: Pol) -> Pol {
        if self.0 == 0 || f.0 == 0 {
            return Pol(0);
        }

        let mut res = Pol(0);
        for i in 0..=f.deg() {
            if f.0 & (1 << i) != 0 {
                let mut a = self;
                for _ in 0..i {
                    a = Pol(a.0 << 1).modulo(g);
                }
                res = res.add(a).modulo(g);
            }
        }
        res
    }

    fn gcd(self, f: Pol) -> Pol {
        let (mut a, mut b) = if self.deg() < f.deg() { (f, self) } else { (self, f) };
        while b.0 != 0 {
            let r = a.modulo(b);
            a = b;
            b = r;
        }
        a
    }

    /// Ben-Or irreducibility test.
    pub fn is_irreducible(&self) -> bool {
        if self.deg() < 1 {
            return false;
        }
        for i in 1..=(self.deg() / 2) {
            if self.gcd(qp(i as u32, *self)).0 != 1 {
                return false;
            }
        }
        true
    }

    /// Picks a random irreducible polynomial of degree 53.
    ///
    /// Each call seeds its own generator from the operating system.
    pub fn random() -> Result<Pol, ChunkingError> {
        let mut rng = StdRng::from_os_rng();

        for _ in 0..RANDOM_POLYNOMIAL_MAX_TRIES {
            let mut f: u64 = rng.random();

            // Keep 54 bits, then force degree 53 and a constant term so the
            // candidate is not trivially divisible by x.
            f &= (1 << 54) - 1;
            f |= (1 << 53) | 1;

            let pol = Pol(f);
            if pol.is_irreducible() {
                return Ok(pol);
            }
        }

        Err(ChunkingError::InvalidPolynomial("unable to find a random irreducible polynomial".to_owned()))
    }
}

/// Computes `(x^(2^p) - x) mod g`.
fn qp(p: u32, g: Pol) -> Pol {
    let num: u64 = 1 << p;

    // start with x
    let mut res = Pol(2);
    let mut i: u64 = 1;
    while i < num {
        res = res.mul_mod(res, g);
        i *= 2;
    }

    res.add(Pol(2)).modulo(g)
}

impl FromStr for Pol {
    type Err = ChunkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let digits = t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")).unwrap_or(t);
        u64::from_str_radix(digits, 16)
            .map(Pol)
            .map_err(|e| ChunkingError::InvalidPolynomial(format!("{s:?}: {e}")))
    }
}

impl FromStrParseable for Pol {}

impl LowerHex for Pol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}

impl Display for Pol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

impl Debug for Pol {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Pol({:#x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_POLYNOMIAL;

    #[test]
    fn test_degree() {
        assert_eq!(Pol::new(0).deg(), -1);
        assert_eq!(Pol::new(1).deg(), 0);
        assert_eq!(Pol::new(0b1011).deg(), 3);
        assert_eq!(DEFAULT_POLYNOMIAL.deg(), 53);
    }

    #[test]
    fn test_modulo() {
        // (x^3 + x + 1) mod (x^2 + 1) = x + x + 1 = 1
        assert_eq!(Pol::new(0b1011).modulo(Pol::new(0b101)), Pol::new(1));
        // (x^2) mod (x^2 + x + 1) = x + 1
        assert_eq!(Pol::new(0b100).modulo(Pol::new(0b111)), Pol::new(0b11));
        assert_eq!(Pol::new(0b11).modulo(Pol::new(0b111)), Pol::new(0b11));
    }

    #[test]
    fn test_irreducible() {
        // x^2 + x + 1 and x^3 + x + 1 are irreducible.
        assert!(Pol::new(0b111).is_irreducible());
        assert!(Pol::new(0b1011).is_irreducible());

        // x^2 + 1 = (x + 1)^2, x^2 = x * x.
        assert!(!Pol::new(0b101).is_irreducible());
        assert!(!Pol::new(0b100).is_irreducible());

        assert!(DEFAULT_POLYNOMIAL.is_irreducible());
        // Flipping a low coefficient of the default makes it divisible by x.
        assert!(!Pol::new(DEFAULT_POLYNOMIAL.value() ^ 1).is_irreducible());
    }

    #[test]
    fn test_random_polynomial() {
        let a = Pol::random().unwrap();
        assert_eq!(a.deg(), 53);
        assert!(a.is_irreducible());
        assert_eq!(a.value() & 1, 1);
    }

    #[test]
    fn test_parse_and_format() {
        let p: Pol = "0x3DA3358B4DC173".parse().unwrap();
        assert_eq!(p, DEFAULT_POLYNOMIAL);
        assert_eq!(p.to_string(), "0x3da3358b4dc173");
        assert_eq!("3da3358b4dc173".parse::<Pol>().unwrap(), p);
        assert!("not a polynomial".parse::<Pol>().is_err());
    }
}

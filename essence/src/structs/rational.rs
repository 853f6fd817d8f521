//! Rational numbers for frame rates, sampling rates and aspect ratios.

use std::fmt::{self, Display};
use std::str::FromStr;

use anyhow::{Result, anyhow};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

pub const FRAME_RATE_23976: Rational = Rational::new(24000, 1001);
pub const FRAME_RATE_24: Rational = Rational::new(24, 1);
pub const FRAME_RATE_25: Rational = Rational::new(25, 1);
pub const FRAME_RATE_2997: Rational = Rational::new(30000, 1001);
pub const FRAME_RATE_30: Rational = Rational::new(30, 1);
pub const FRAME_RATE_50: Rational = Rational::new(50, 1);
pub const FRAME_RATE_5994: Rational = Rational::new(60000, 1001);
pub const FRAME_RATE_60: Rational = Rational::new(60, 1);
pub const FRAME_RATE_100: Rational = Rational::new(100, 1);
pub const FRAME_RATE_11988: Rational = Rational::new(120000, 1001);
pub const FRAME_RATE_120: Rational = Rational::new(120, 1);

/// Frame rates accepted by every picture essence without a narrower list.
pub const STANDARD_FRAME_RATES: [Rational; 8] = [
    FRAME_RATE_23976,
    FRAME_RATE_24,
    FRAME_RATE_25,
    FRAME_RATE_2997,
    FRAME_RATE_30,
    FRAME_RATE_50,
    FRAME_RATE_5994,
    FRAME_RATE_60,
];

pub const SAMPLING_RATE_48K: Rational = Rational::new(48000, 1);
pub const SAMPLING_RATE_96K: Rational = Rational::new(96000, 1);

pub const ASPECT_RATIO_4_3: Rational = Rational::new(4, 3);
pub const ASPECT_RATIO_16_9: Rational = Rational::new(16, 9);

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs()
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Self { num, den }
    }

    pub fn reduced(self) -> Self {
        let g = gcd(self.num as i64, self.den as i64);
        if g <= 1 {
            return self;
        }
        Self::new((self.num as i64 / g) as i32, (self.den as i64 / g) as i32)
    }

    pub fn is_zero(&self) -> bool {
        self.num == 0 || self.den == 0
    }

    pub fn to_f64(self) -> f64 {
        if self.den == 0 {
            return 0.0;
        }
        self.num as f64 / self.den as f64
    }

    /// Integer part of the rate, rounded to the nearest edit unit (29.97 -> 30).
    pub fn rounded(self) -> u32 {
        if self.den == 0 {
            return 0;
        }
        ((self.num as i64 + self.den as i64 / 2) / self.den as i64) as u32
    }
}

impl Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Accepts `num/den`, whole numbers, and the usual broadcast shorthands
/// (`23976`, `2997`, `5994`, `11988`).
impl FromStr for Rational {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some((num, den)) = s.split_once('/').or_else(|| s.split_once(':')) {
            let num: i32 = num.trim().parse()?;
            let den: i32 = den.trim().parse()?;
            if num <= 0 || den <= 0 {
                return Err(anyhow!("invalid rational '{s}'"));
            }
            return Ok(Self::new(num, den));
        }

        match s {
            "23976" | "23.976" => Ok(FRAME_RATE_23976),
            "2997" | "29.97" => Ok(FRAME_RATE_2997),
            "5994" | "59.94" => Ok(FRAME_RATE_5994),
            "11988" | "119.88" => Ok(FRAME_RATE_11988),
            _ => {
                let num: i32 = s.parse().map_err(|_| anyhow!("invalid rational '{s}'"))?;
                if num <= 0 {
                    return Err(anyhow!("invalid rational '{s}'"));
                }
                Ok(Self::new(num, 1))
            }
        }
    }
}

#[test]
fn test_rational_parse() {
    assert_eq!("2997".parse::<Rational>().unwrap(), FRAME_RATE_2997);
    assert_eq!("25".parse::<Rational>().unwrap(), FRAME_RATE_25);
    assert_eq!("16:9".parse::<Rational>().unwrap(), ASPECT_RATIO_16_9);
    assert_eq!(
        "60000/1001".parse::<Rational>().unwrap(),
        FRAME_RATE_5994
    );
    assert!("0/1".parse::<Rational>().is_err());
    assert!("fast".parse::<Rational>().is_err());

    assert_eq!(Rational::new(8008, 5).reduced(), Rational::new(8008, 5));
    assert_eq!(Rational::new(48000, 25).reduced(), Rational::new(1920, 1));
    assert_eq!(FRAME_RATE_2997.rounded(), 30);
}

//! Arithmetic over apimachinery quantity strings.
//!
//! `Quantity` is transported as a string (`"10"`, `"500m"`, `"1.5Gi"`,
//! `"2e3"`). Aggregating usage across namespaces needs addition and a
//! semantic comparator: `"0.1"` and `"100m"` are the same amount even though
//! the strings differ. Values are held as `mantissa * 10^exponent` with an
//! i128 mantissa, which comfortably covers cluster-scale sums.

use std::collections::{BTreeMap, BTreeSet};

use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::util::Error;

/// Usage keyed by resource name (`pods`, `requests.cpu`, `count/secrets`, ...).
pub type UsedMap = BTreeMap<String, Quantity>;

/// Suffix family of the source string; addition preserves the left operand's
/// family so summed memory stays in binary notation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    BinarySi,
    DecimalSi,
    DecimalExponent,
}

#[derive(Clone, Copy, Debug)]
pub struct Parsed {
    mantissa: i128,
    exponent: i32,
    format: Format,
}

const DECIMAL_SUFFIXES: &[(&str, i32)] = &[
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

const BINARY_SUFFIXES: &[(&str, u32)] = &[
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

pub fn parse(q: &Quantity) -> Result<Parsed, Error> {
    let s = q.0.as_str();
    let invalid = || Error::InvalidQuantity(s.to_string());

    let (sign, rest) = match s.strip_prefix('-') {
        Some(rest) => (-1i128, rest),
        None => (1i128, s.strip_prefix('+').unwrap_or(s)),
    };

    let number_len = rest
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(rest.len());
    let (number, suffix) = rest.split_at(number_len);
    if number.is_empty() {
        return Err(invalid());
    }

    let mut mantissa: i128 = 0;
    let mut exponent: i32 = 0;
    let mut seen_dot = false;
    for c in number.chars() {
        if c == '.' {
            if seen_dot {
                return Err(invalid());
            }
            seen_dot = true;
            continue;
        }
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add((c as u8 - b'0') as i128))
            .ok_or_else(invalid)?;
        if seen_dot {
            exponent -= 1;
        }
    }
    mantissa *= sign;

    let format;
    if suffix.is_empty() {
        format = Format::DecimalSi;
    } else if let Some((_, power)) = BINARY_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        mantissa = mantissa.checked_mul(1i128 << power).ok_or_else(invalid)?;
        format = Format::BinarySi;
    } else if let Some((_, exp)) = DECIMAL_SUFFIXES.iter().find(|(sfx, _)| *sfx == suffix) {
        exponent += exp;
        format = Format::DecimalSi;
    } else if let Some(exp) = suffix
        .strip_prefix(['e', 'E'])
        .filter(|rest| !rest.is_empty())
    {
        exponent += exp.parse::<i32>().map_err(|_| invalid())?;
        format = Format::DecimalExponent;
    } else {
        return Err(invalid());
    }

    Ok(Parsed {
        mantissa,
        exponent,
        format,
    }
    .normalized())
}

impl Parsed {
    pub fn zero() -> Self {
        Parsed {
            mantissa: 0,
            exponent: 0,
            format: Format::DecimalSi,
        }
    }

    pub fn from_integer(value: i128) -> Self {
        Parsed {
            mantissa: value,
            exponent: 0,
            format: Format::DecimalSi,
        }
        .normalized()
    }

    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Unique form: mantissa carries no factor of ten (zero is `0 * 10^0`),
    /// so two equal values always compare field-equal.
    fn normalized(mut self) -> Self {
        if self.mantissa == 0 {
            self.exponent = 0;
            return self;
        }
        while self.mantissa % 10 == 0 {
            self.mantissa /= 10;
            self.exponent += 1;
        }
        self
    }

    fn same_value(&self, other: &Parsed) -> bool {
        self.mantissa == other.mantissa && self.exponent == other.exponent
    }

    /// Sum preserving the left operand's suffix family. Saturates at the
    /// i128 mantissa range, far beyond any real cluster aggregate.
    pub fn add(&self, other: &Parsed) -> Parsed {
        let format = if self.is_zero() {
            other.format
        } else {
            self.format
        };
        let exponent = self.exponent.min(other.exponent);
        let a = scale_mantissa(self.mantissa, (self.exponent - exponent) as u32);
        let b = scale_mantissa(other.mantissa, (other.exponent - exponent) as u32);
        Parsed {
            mantissa: a.saturating_add(b),
            exponent,
            format,
        }
        .normalized()
    }

    /// The larger of the two values, by value rather than by notation.
    pub fn max(self, other: Parsed) -> Parsed {
        let exponent = self.exponent.min(other.exponent);
        let a = scale_mantissa(self.mantissa, (self.exponent - exponent) as u32);
        let b = scale_mantissa(other.mantissa, (other.exponent - exponent) as u32);
        if a >= b { self } else { other }
    }

    /// Canonical string form, e.g. `300m`, `2Gi`, `30k`, `5e3`.
    pub fn to_quantity(&self) -> Quantity {
        Quantity(self.render())
    }

    fn render(&self) -> String {
        if self.mantissa == 0 {
            return "0".to_string();
        }
        match self.format {
            Format::DecimalExponent => {
                if self.exponent == 0 {
                    format!("{}", self.mantissa)
                } else {
                    format!("{}e{}", self.mantissa, self.exponent)
                }
            }
            Format::BinarySi if self.exponent >= 0 => self.render_binary(),
            _ => self.render_decimal(),
        }
    }

    fn render_binary(&self) -> String {
        let Some(value) = 10i128
            .checked_pow(self.exponent as u32)
            .and_then(|p| self.mantissa.checked_mul(p))
        else {
            return self.render_decimal();
        };
        for (sfx, power) in BINARY_SUFFIXES.iter().rev() {
            let unit = 1i128 << power;
            if value.abs() >= unit && value % unit == 0 {
                return format!("{}{}", value / unit, sfx);
            }
        }
        format!("{}", value)
    }

    fn render_decimal(&self) -> String {
        let (m, e) = (self.mantissa, self.exponent);
        if e >= 0 {
            // Largest positive decimal suffix that keeps the digits integral.
            let s = (e - e % 3).min(18);
            let digits = format!("{}{}", m, "0".repeat((e - s) as usize));
            match DECIMAL_SUFFIXES.iter().find(|(_, exp)| *exp == s) {
                Some((sfx, _)) if s != 0 => format!("{}{}", digits, sfx),
                _ => digits,
            }
        } else {
            let s = e.div_euclid(3) * 3;
            if s >= -9 {
                let digits = format!("{}{}", m, "0".repeat((e - s) as usize));
                let sfx = DECIMAL_SUFFIXES
                    .iter()
                    .find(|(_, exp)| *exp == s)
                    .map(|(sfx, _)| *sfx)
                    .unwrap_or("");
                format!("{}{}", digits, sfx)
            } else {
                // Finer than nano: plain decimal fraction.
                let digits = m.unsigned_abs().to_string();
                let sign = if m < 0 { "-" } else { "" };
                let frac = (-e) as usize;
                if digits.len() > frac {
                    let (int, fract) = digits.split_at(digits.len() - frac);
                    format!("{}{}.{}", sign, int, fract)
                } else {
                    format!("{}0.{}{}", sign, "0".repeat(frac - digits.len()), digits)
                }
            }
        }
    }
}

fn scale_mantissa(m: i128, by: u32) -> i128 {
    10i128
        .checked_pow(by)
        .and_then(|p| m.checked_mul(p))
        .unwrap_or(if m < 0 { i128::MIN } else { i128::MAX })
}

pub fn zero() -> Quantity {
    Quantity("0".to_string())
}

/// Adds every entry of `rhs` into `acc` per resource name.
pub fn add_into(acc: &mut UsedMap, rhs: &UsedMap) -> Result<(), Error> {
    for (resource, amount) in rhs {
        let sum = match acc.get(resource) {
            Some(existing) => parse(existing)?.add(&parse(amount)?).to_quantity(),
            None => parse(amount)?.to_quantity(),
        };
        acc.insert(resource.clone(), sum);
    }
    Ok(())
}

/// Restricts `map` to the given resource names. Case-sensitive exact match.
pub fn mask(map: &UsedMap, keys: &BTreeSet<String>) -> UsedMap {
    map.iter()
        .filter(|(resource, _)| keys.contains(*resource))
        .map(|(resource, amount)| (resource.clone(), amount.clone()))
        .collect()
}

/// A used-map with every resource name present at zero.
pub fn zero_filled(keys: &BTreeSet<String>) -> UsedMap {
    keys.iter().map(|k| (k.clone(), zero())).collect()
}

/// Canonical-form comparison: `"0.1" == "100m"`. Unparseable values fall back
/// to string comparison.
pub fn semantic_eq(a: &UsedMap, b: &UsedMap) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(resource, left)| match b.get(resource) {
        Some(right) => match (parse(left), parse(right)) {
            (Ok(l), Ok(r)) => l.same_value(&r),
            _ => left.0 == right.0,
        },
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity(s.to_string())
    }

    fn sum(a: &str, b: &str) -> String {
        parse(&q(a))
            .unwrap()
            .add(&parse(&q(b)).unwrap())
            .to_quantity()
            .0
    }

    #[test]
    fn parses_plain_integers() {
        let p = parse(&q("10")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (1, 1));
        assert!(!p.is_zero());
        assert!(parse(&q("0")).unwrap().is_zero());
    }

    #[test]
    fn parses_decimal_suffixes() {
        let p = parse(&q("100m")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (1, -1));
        let p = parse(&q("2k")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (2, 3));
    }

    #[test]
    fn parses_binary_suffixes() {
        let p = parse(&q("1Ki")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (1024, 0));
        let p = parse(&q("1.5Gi")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (1610612736, 0));
    }

    #[test]
    fn exa_suffix_is_not_an_exponent() {
        let p = parse(&q("1E")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (1, 18));
        let p = parse(&q("1e2")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (1, 2));
    }

    #[test]
    fn parses_fractions_and_signs() {
        let p = parse(&q("0.5")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (5, -1));
        let p = parse(&q("-1.5")).unwrap();
        assert_eq!((p.mantissa, p.exponent), (-15, -1));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "abc", "1.2.3", "1x", "e3", "--1"] {
            assert!(parse(&q(bad)).is_err(), "expected {bad:?} to fail");
        }
    }

    #[test]
    fn addition_preserves_suffix_family() {
        assert_eq!(sum("100m", "200m"), "300m");
        assert_eq!(sum("1Gi", "1Gi"), "2Gi");
        assert_eq!(sum("1", "2"), "3");
        assert_eq!(sum("500m", "500m"), "1");
    }

    #[test]
    fn addition_across_scales() {
        assert_eq!(sum("1", "500m"), "1500m");
        assert_eq!(sum("1Ki", "1"), "1025");
    }

    #[test]
    fn zero_adopts_the_other_operands_format() {
        assert_eq!(sum("0", "2Gi"), "2Gi");
    }

    #[test]
    fn renders_decimal_suffixes_canonically() {
        assert_eq!(parse(&q("30000")).unwrap().to_quantity().0, "30k");
        assert_eq!(parse(&q("1e3")).unwrap().to_quantity().0, "1e3");
        assert_eq!(parse(&q("0.001")).unwrap().to_quantity().0, "1m");
    }

    #[test]
    fn semantic_equality_ignores_formatting() {
        let a: UsedMap = [("cpu".to_string(), q("100m"))].into();
        let b: UsedMap = [("cpu".to_string(), q("0.1"))].into();
        assert!(semantic_eq(&a, &b));

        let c: UsedMap = [("mem".to_string(), q("1Ki"))].into();
        let d: UsedMap = [("mem".to_string(), q("1024"))].into();
        assert!(semantic_eq(&c, &d));

        let e: UsedMap = [("cpu".to_string(), q("101m"))].into();
        assert!(!semantic_eq(&a, &e));
    }

    #[test]
    fn masking_is_exact_match() {
        let map: UsedMap = [
            ("pods".to_string(), q("3")),
            ("services".to_string(), q("1")),
        ]
        .into();
        let keys: BTreeSet<String> = ["pods".to_string(), "Pods".to_string()].into();
        let masked = mask(&map, &keys);
        assert_eq!(masked.len(), 1);
        assert!(masked.contains_key("pods"));
    }

    #[test]
    fn add_into_accumulates_per_resource() {
        let mut acc = zero_filled(&["pods".to_string()].into());
        let rhs: UsedMap = [
            ("pods".to_string(), q("2")),
            ("services".to_string(), q("1")),
        ]
        .into();
        add_into(&mut acc, &rhs).unwrap();
        add_into(&mut acc, &rhs).unwrap();
        assert_eq!(acc.get("pods").unwrap().0, "4");
        assert_eq!(acc.get("services").unwrap().0, "2");
    }
}

//! Screening function kinds for the classical screened-Coulomb potential
//! `V(r) = Z1 Z2 e^2 / r * Phi(r/a)`.

use crate::units::BOHR_RADIUS_NM;
use serde::{Deserialize, Serialize};

const SCREEN_CONST: f64 = 0.88534;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Screening {
    None,
    LenzJensen,
    KrC,
    Moliere,
    Zbl,
    ZblMagic,
}

impl Screening {
    pub fn name(self) -> &'static str {
        match self {
            Screening::None => "Unscreened Coulomb",
            Screening::LenzJensen => "Lenz-Jensen",
            Screening::KrC => "Kr-C",
            Screening::Moliere => "Moliere",
            Screening::Zbl => "Ziegler-Biersack-Littmark",
            Screening::ZblMagic => "ZBL-MAGIC",
        }
    }

    pub fn screening_length(self, z1: u8, z2: u8) -> f64 {
        let z1 = z1 as f64;
        let z2 = z2 as f64;
        match self {
            Screening::None => 1.0,
            Screening::LenzJensen => {
                SCREEN_CONST * BOHR_RADIUS_NM as f64 / (z1.powf(2.0 / 3.0) + z2.powf(2.0 / 3.0)).sqrt()
            }
            _ => SCREEN_CONST * BOHR_RADIUS_NM as f64 / (z1.powf(0.23) + z2.powf(0.23)),
        }
    }

    /// `Phi(x)`, the dimensionless screening function.
    pub fn phi(self, x: f64) -> f64 {
        match self {
            Screening::None => 1.0,
            Screening::LenzJensen => {
                let y = 3.108 * x.sqrt();
                (-y).exp() * (1.0 + y * (1.0 + y * (0.3344 + y * (0.0485 + 2.647e-3 * y))))
            }
            Screening::KrC => sum_exp(x, &KRC_C, &KRC_A),
            Screening::Moliere => sum_exp(x, &MOLIERE_C, &MOLIERE_A),
            Screening::Zbl | Screening::ZblMagic => sum_exp(x, &ZBL_C, &ZBL_A),
        }
    }

    /// Screening-coefficient pairs, used by the impulse-approximation
    /// scattering angle for screenings expressed as a sum of exponentials.
    pub fn coefficients(self) -> Option<(&'static [f64], &'static [f64])> {
        match self {
            Screening::KrC => Some((&KRC_C, &KRC_A)),
            Screening::Moliere => Some((&MOLIERE_C, &MOLIERE_A)),
            Screening::Zbl | Screening::ZblMagic => Some((&ZBL_C, &ZBL_A)),
            _ => None,
        }
    }
}

fn sum_exp(x: f64, c: &[f64], a: &[f64]) -> f64 {
    c.iter().zip(a.iter()).map(|(ci, ai)| ci * (-ai * x).exp()).sum()
}

const KRC_C: [f64; 3] = [0.190945, 0.473674, 0.335381];
const KRC_A: [f64; 3] = [0.278544, 0.637174, 1.919249];

const MOLIERE_C: [f64; 3] = [0.35, 0.55, 0.10];
const MOLIERE_A: [f64; 3] = [0.30, 1.20, 6.00];

const ZBL_C: [f64; 4] = [0.18175, 0.50986, 0.28022, 0.028171];
const ZBL_A: [f64; 4] = [3.19980, 0.94229, 0.40290, 0.201620];

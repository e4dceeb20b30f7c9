//! Body metrics: BMI and daily calorie targets
//!
//! BMR uses the Mifflin-St Jeor equation (1990):
//! `10 x weight_kg + 6.25 x height_cm - 5 x age + offset`, where the offset
//! is +5 for men and -161 for women.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Gender, as used by the BMR offset
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Self-reported physical activity level
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Minimal,
    Light,
    Moderate,
    High,
}

/// Training goal chosen at registration
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    GainMass,
    LoseWeight,
    Maintain,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn label(self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Match a menu label typed back as text
    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| label_matches(text, g.label()))
    }
}

impl ActivityLevel {
    pub const ALL: [ActivityLevel; 4] = [
        ActivityLevel::Minimal,
        ActivityLevel::Light,
        ActivityLevel::Moderate,
        ActivityLevel::High,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ActivityLevel::Minimal => "Minimal",
            ActivityLevel::Light => "Light",
            ActivityLevel::Moderate => "Moderate",
            ActivityLevel::High => "High",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityLevel::Minimal => "minimal",
            ActivityLevel::Light => "light",
            ActivityLevel::Moderate => "moderate",
            ActivityLevel::High => "high",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| label_matches(text, a.label()))
    }

    /// TDEE multiplier applied to BMR
    pub fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Minimal => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::High => 1.725,
        }
    }
}

impl Goal {
    pub const ALL: [Goal; 3] = [Goal::GainMass, Goal::LoseWeight, Goal::Maintain];

    pub fn label(self) -> &'static str {
        match self {
            Goal::GainMass => "Gain mass",
            Goal::LoseWeight => "Lose weight",
            Goal::Maintain => "Maintain",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Goal::GainMass => "gain_mass",
            Goal::LoseWeight => "lose_weight",
            Goal::Maintain => "maintain",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| label_matches(text, g.label()))
    }
}

macro_rules! impl_db_text {
    ($ty:ty) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .into_iter()
                    .find(|v| v.as_str() == s)
                    .ok_or_else(|| format!("unknown {}: {s}", stringify!($ty)))
            }
        }
    };
}

impl_db_text!(Gender);
impl_db_text!(ActivityLevel);
impl_db_text!(Goal);

fn label_matches(text: &str, label: &str) -> bool {
    text.trim().eq_ignore_ascii_case(label)
}

// ============================================================================
// BMI
// ============================================================================

/// BMI category with the standard 18.5 / 25 / 30 thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BmiCategory {
    Underweight,
    Normal,
    Overweight,
    Obese,
    /// Height was zero, no meaningful value
    NotAvailable,
}

impl BmiCategory {
    pub fn label(self) -> &'static str {
        match self {
            BmiCategory::Underweight => "Underweight",
            BmiCategory::Normal => "Normal",
            BmiCategory::Overweight => "Overweight",
            BmiCategory::Obese => "Obese",
            BmiCategory::NotAvailable => "N/A",
        }
    }

    /// Goal worth suggesting before the user picks one
    pub fn recommended_goal(self) -> Option<Goal> {
        match self {
            BmiCategory::Overweight | BmiCategory::Obese => Some(Goal::LoseWeight),
            BmiCategory::Underweight => Some(Goal::GainMass),
            BmiCategory::Normal | BmiCategory::NotAvailable => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Bmi {
    /// Rounded to one decimal place
    pub value: f64,
    pub category: BmiCategory,
}

/// Body mass index from weight in kg and height in cm.
///
/// Zero height yields `(0, N/A)` instead of dividing by zero.
pub fn bmi(weight_kg: f64, height_cm: u32) -> Bmi {
    if height_cm == 0 {
        return Bmi {
            value: 0.0,
            category: BmiCategory::NotAvailable,
        };
    }

    let height_m = f64::from(height_cm) / 100.0;
    let value = round_to_tenth(weight_kg / (height_m * height_m));

    let category = if value < 18.5 {
        BmiCategory::Underweight
    } else if value < 25.0 {
        BmiCategory::Normal
    } else if value < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    };

    Bmi { value, category }
}

fn round_to_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ============================================================================
// Calories
// ============================================================================

/// Daily calorie targets per goal, in kcal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalorieTargets {
    pub lose_weight: i64,
    pub maintain: i64,
    pub gain_mass: i64,
}

impl CalorieTargets {
    pub fn for_goal(&self, goal: Goal) -> i64 {
        match goal {
            Goal::LoseWeight => self.lose_weight,
            Goal::Maintain => self.maintain,
            Goal::GainMass => self.gain_mass,
        }
    }
}

/// Basal metabolic rate (Mifflin-St Jeor)
pub fn mifflin_st_jeor(gender: Gender, weight_kg: f64, height_cm: u32, age: u32) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * f64::from(height_cm) - 5.0 * f64::from(age);
    match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    }
}

/// Maintenance = BMR x activity multiplier; loss is 85% and gain 115% of it
pub fn daily_calories(
    gender: Gender,
    weight_kg: f64,
    height_cm: u32,
    age: u32,
    activity_level: ActivityLevel,
) -> CalorieTargets {
    let bmr = mifflin_st_jeor(gender, weight_kg, height_cm, age);
    let maintain = round_kcal(bmr * activity_level.multiplier());

    #[allow(clippy::cast_precision_loss)] // kcal values are far below 2^52
    let maintain_f = maintain as f64;

    CalorieTargets {
        lose_weight: round_kcal(maintain_f * 0.85),
        maintain,
        gain_mass: round_kcal(maintain_f * 1.15),
    }
}

#[allow(clippy::cast_possible_truncation)] // rounded kcal fit comfortably in i64
fn round_kcal(value: f64) -> i64 {
    value.round() as i64
}

use super::error::BmiError;
use crate::models::{BmiCategory, BmiReport};

/// BMI from height in centimetres and weight in kilograms, rounded to one decimal.
pub fn calculate(height_cm: f64, weight_kg: f64) -> Result<BmiReport, BmiError> {
    if !height_cm.is_finite() || !weight_kg.is_finite() || height_cm <= 0.0 || weight_kg <= 0.0 {
        return Err(BmiError::InvalidMeasurement);
    }

    let height_m = height_cm / 100.0;
    let bmi = (weight_kg / (height_m * height_m) * 10.0).round() / 10.0;
    let category = categorize(bmi);

    Ok(BmiReport {
        bmi,
        category,
        advice: advice_for(category).to_string(),
    })
}

pub fn categorize(bmi: f64) -> BmiCategory {
    if bmi < 18.5 {
        BmiCategory::Underweight
    } else if bmi < 25.0 {
        BmiCategory::Normal
    } else if bmi < 30.0 {
        BmiCategory::Overweight
    } else {
        BmiCategory::Obese
    }
}

fn advice_for(category: BmiCategory) -> &'static str {
    match category {
        BmiCategory::Underweight => "Consider consulting a nutritionist to gain weight healthily.",
        BmiCategory::Normal => "Good job! Maintain a balanced diet and regular exercise.",
        BmiCategory::Overweight => "Aim for gradual weight loss through calorie deficit and activity.",
        BmiCategory::Obese => "Highly recommended to see a doctor for personalized health plan.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_normal() {
        let report = calculate(170.0, 65.0).unwrap();
        assert_eq!(report.bmi, 22.5);
        assert_eq!(report.category, BmiCategory::Normal);
        assert!(report.advice.starts_with("Good job"));
    }

    #[test]
    fn test_category_boundaries() {
        assert_eq!(categorize(18.4), BmiCategory::Underweight);
        assert_eq!(categorize(18.5), BmiCategory::Normal);
        assert_eq!(categorize(24.9), BmiCategory::Normal);
        assert_eq!(categorize(25.0), BmiCategory::Overweight);
        assert_eq!(categorize(29.9), BmiCategory::Overweight);
        assert_eq!(categorize(30.0), BmiCategory::Obese);
    }

    #[test]
    fn test_rounding_decides_category() {
        // 18.47 rounds up to 18.5
        let report = calculate(180.0, 59.85).unwrap();
        assert_eq!(report.bmi, 18.5);
        assert_eq!(report.category, BmiCategory::Normal);
    }

    #[test]
    fn test_invalid_measurements() {
        assert_eq!(calculate(0.0, 70.0), Err(BmiError::InvalidMeasurement));
        assert_eq!(calculate(170.0, -1.0), Err(BmiError::InvalidMeasurement));
        assert_eq!(calculate(f64::NAN, 70.0), Err(BmiError::InvalidMeasurement));
        assert_eq!(calculate(170.0, f64::INFINITY), Err(BmiError::InvalidMeasurement));
    }
}

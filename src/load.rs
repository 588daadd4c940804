use crate::models::{Modality, Serie};
use crate::utils::parse_first_int;

/// Load contribution of a single set, with a printable breakdown of how the
/// number was reached.
#[derive(Debug, Clone, PartialEq)]
pub struct SetLoad {
    pub total: f64,
    pub breakdown: String,
}

impl SetLoad {
    fn zero(breakdown: impl Into<String>) -> Self {
        Self {
            total: 0.0,
            breakdown: breakdown.into(),
        }
    }
}

/// Computes the load of one serie under the given modality.
///
/// Reps come from the first integer embedded in the reps string ("8-12" counts
/// as 8). A reps string without digits yields 0 reps and 0 load, never an
/// error. Time-based sets hold no load since a duration does not convert to
/// kilograms.
pub fn serie_load(serie: &Serie, modality: &Modality, body_weight: f32) -> SetLoad {
    if serie.time_based {
        let secs = parse_first_int(&serie.reps);
        return SetLoad::zero(format!("{}s - sem carga", secs));
    }

    let reps = parse_first_int(&serie.reps);
    if reps == 0 {
        return SetLoad::zero("0 reps - sem carga");
    }

    let weight = f64::from(serie.weight.unwrap_or(0.0));
    let reps_f = f64::from(reps);

    match modality {
        Modality::Bodyweight => {
            let total = f64::from(body_weight) * reps_f;
            SetLoad {
                total,
                breakdown: format!("{}kg corporal x {} = {}kg", body_weight, reps, total),
            }
        }
        Modality::Barbell { bar_weight } => {
            let total = (f64::from(*bar_weight) + 2.0 * weight) * reps_f;
            SetLoad {
                total,
                breakdown: format!(
                    "({}kg + 2 x {}kg) x {} = {}kg",
                    bar_weight,
                    serie.weight.unwrap_or(0.0),
                    reps,
                    total
                ),
            }
        }
        Modality::BilateralDumbbell => {
            let total = 2.0 * weight * reps_f;
            SetLoad {
                total,
                breakdown: format!(
                    "2 x {}kg x {} = {}kg",
                    serie.weight.unwrap_or(0.0),
                    reps,
                    total
                ),
            }
        }
        Modality::Unilateral => {
            let total = weight * reps_f;
            SetLoad {
                total,
                breakdown: format!(
                    "{}kg x {} = {}kg",
                    serie.weight.unwrap_or(0.0),
                    reps,
                    total
                ),
            }
        }
    }
}

/// Sums the load of every completed serie across all entries. Used whenever
/// the running total has to be rebuilt after a bulk edit instead of patched
/// incrementally.
pub fn recompute_total(
    entries: &[crate::models::ExerciseEntry],
    body_weight: f32,
) -> f64 {
    entries
        .iter()
        .flat_map(|entry| {
            entry
                .series
                .iter()
                .filter(|s| s.completed)
                .map(|s| serie_load(s, &entry.modality, body_weight).total)
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExerciseEntry, SetKind};

    fn serie(reps: &str, weight: Option<f32>) -> Serie {
        Serie::new(reps, weight)
    }

    #[test]
    fn bodyweight_uses_user_weight_times_reps() {
        let s = serie("12", None);
        let load = serie_load(&s, &Modality::Bodyweight, 80.0);
        assert_eq!(load.total, 960.0);
        assert!(load.breakdown.contains("corporal"));
    }

    #[test]
    fn barbell_counts_bar_plus_both_sides() {
        let s = serie("8-12", Some(10.0));
        let load = serie_load(&s, &Modality::Barbell { bar_weight: 20.0 }, 80.0);
        assert_eq!(load.total, 320.0); // (20 + 2*10) * 8
    }

    #[test]
    fn bilateral_dumbbell_doubles_the_weight() {
        let s = serie("10", Some(12.5));
        let load = serie_load(&s, &Modality::BilateralDumbbell, 80.0);
        assert_eq!(load.total, 250.0);
    }

    #[test]
    fn unilateral_is_plain_weight_times_reps() {
        let s = serie("10", Some(25.0));
        let load = serie_load(&s, &Modality::Unilateral, 80.0);
        assert_eq!(load.total, 250.0);
    }

    #[test]
    fn reps_without_digits_yield_zero_load() {
        let s = serie("amrap", Some(40.0));
        let load = serie_load(&s, &Modality::Unilateral, 80.0);
        assert_eq!(load.total, 0.0);
    }

    #[test]
    fn time_based_sets_carry_no_load() {
        let mut s = serie("45", Some(40.0));
        s.time_based = true;
        let load = serie_load(&s, &Modality::Unilateral, 80.0);
        assert_eq!(load.total, 0.0);
        assert!(load.breakdown.contains("45s"));
    }

    #[test]
    fn recompute_only_counts_completed_series() {
        let mut entry = ExerciseEntry::new("Supino", Modality::Barbell { bar_weight: 20.0 }, 90);
        entry.series = vec![serie("8", Some(10.0)), serie("8", Some(10.0))];
        entry.series[0].completed = true;

        let mut pull = ExerciseEntry::new("Barra fixa", Modality::Bodyweight, 120);
        pull.series = vec![serie("12", None)];
        pull.series[0].completed = true;

        let total = recompute_total(&[entry, pull], 80.0);
        assert_eq!(total, 320.0 + 960.0);
    }

    #[test]
    fn dropset_loads_like_a_normal_set() {
        let mut s = serie("8", Some(14.0));
        s.kind = SetKind::Dropset;
        let load = serie_load(&s, &Modality::BilateralDumbbell, 80.0);
        assert_eq!(load.total, 2.0 * 14.0 * 8.0);
    }
}

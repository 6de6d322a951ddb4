// Copyright (c) 2026, Chad Hogan
// All rights reserved.
//
// This source code is licensed under the BSD-3-Clause license found in the
// LICENSE file in the root directory of this source tree.

use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::assemble::{assemble, FinalFit, SolveResult};
use crate::control::RunControl;
use crate::core::{Event, PhaseObservation, StationRoster};
use crate::design::{DesignBuilder, Evaluation, Observation, Trial, Unknown};
use crate::error::{HypoError, Result};
use crate::geodesy;
use crate::linalg::{normal_equations, solve_normal, standard_errors};
use crate::velocity::{LayeredModel, TravelTimeModel};

/// Minimum usable readings for an epicenter and origin time.
const MIN_OBSERVATIONS: usize = 3;

/// Northward offset of the default starting epicenter from the first
/// station, km. Keeps the first distances non-zero.
const START_OFFSET_KM: f64 = 0.1;

/// How the iteration ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Termination {
    /// RMS and step both settled below tolerance.
    Converged,
    /// Iteration cap hit; the last trial is reported.
    MaxIterationsReached,
    /// RMS kept rising; the best trial seen is reported.
    Diverged,
}

impl Termination {
    /// True for terminations that lower the solution grade.
    pub fn is_degraded(self) -> bool {
        self != Termination::Converged
    }
}

/// Non-fatal conditions met during a solve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveWarning {
    /// RMS increased `divergence_limit` times in a row.
    Diverged {
        /// Iteration at which the solve gave up.
        iteration: usize,
    },
    /// The iteration cap was reached.
    MaxIterationsReached {
        /// The cap.
        iterations: usize,
    },
    /// Readings were skipped because no ray path existed.
    DroppedObservations {
        /// Iteration whose trial caused the drop.
        iteration: usize,
        /// Number of readings skipped.
        count: usize,
    },
}

/// Trial at the start of one iteration and the step taken from it.
///
/// A converged or capped solve closes its history with one more snapshot
/// holding the reported trial and a zero step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationSnapshot {
    /// Iteration number, from 1.
    pub iteration: usize,
    /// Trial latitude, decimal degrees.
    pub latitude: f64,
    /// Trial longitude, decimal degrees.
    pub longitude: f64,
    /// Trial depth, km.
    pub depth: f64,
    /// Trial origin, seconds after the reference minute.
    pub origin_offset: f64,
    /// Weighted RMS at the trial, seconds.
    pub rms: f64,
    /// Weighted RMS after the step, seconds.
    pub rms_after: f64,
    /// Applied step: east km, north km, depth km, origin s.
    pub step: [f64; 4],
    /// Factor the solved step was scaled by.
    pub damping: f64,
    /// Usable readings at the trial.
    pub observations: usize,
    /// Depth was not adjusted this iteration.
    pub depth_frozen: bool,
    /// Unknowns frozen by the solver this iteration.
    pub frozen: Vec<Unknown>,
    /// Readings dropped for lack of a ray path.
    pub dropped: usize,
}

/// Locates earthquakes against a fixed velocity model, station roster and
/// run control.
///
/// A single solve is sequential. Independent events can be located in
/// parallel with [`Locator::locate_batch`]; the shared inputs are only ever
/// borrowed immutably.
pub struct Locator<'a, M: TravelTimeModel = LayeredModel> {
    model: &'a M,
    roster: &'a StationRoster,
    control: &'a RunControl,
    num_threads: Option<usize>,
}

impl<'a, M: TravelTimeModel> Locator<'a, M> {
    /// Create a locator.
    ///
    /// # Errors
    /// Returns an error if the run control fails validation.
    pub fn new(model: &'a M, roster: &'a StationRoster, control: &'a RunControl) -> Result<Self> {
        control.validate()?;
        Ok(Locator {
            model,
            roster,
            control,
            num_threads: None,
        })
    }

    /// Set the number of worker threads for batch solves (builder method).
    /// If not specified, defaults to the number of available CPU cores.
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.num_threads = Some(threads);
        self
    }

    /// The run control in use.
    pub fn control(&self) -> &RunControl {
        self.control
    }

    fn get_num_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    /// Locate one event.
    ///
    /// # Errors
    /// Returns `UnknownStation` or `InvalidArrivalTime` for bad readings,
    /// `InsufficientData` when fewer than three readings carry weight, and
    /// `SingularSystem` when no unknown can be solved for.
    pub fn locate(&self, label: &str, phases: &[PhaseObservation]) -> Result<SolveResult> {
        let reference = reference_minute(phases)?;
        let observations = self.resolve(phases, reference)?;
        let builder = DesignBuilder::new(self.model, self.control);
        let policy = &self.control.policy;

        let start = self.initial_trial(&builder, &observations)?;
        let mut eval = builder.evaluate(start, &observations);
        check_usable(&eval)?;

        let mut history: Vec<IterationSnapshot> = Vec::new();
        let mut warnings: Vec<SolveWarning> = Vec::new();
        let mut best = eval.clone();
        // History index of the snapshot whose trial is `best`
        let mut best_index = 0;
        let mut increases = 0;
        let mut termination = Termination::MaxIterationsReached;

        for iteration in 1..=policy.max_iterations {
            let unknowns = self.free_unknowns(eval.usable());
            let system = builder.assemble(&eval, &unknowns);
            let (normal, rhs) =
                normal_equations(&system.jacobian, &system.residuals, &system.weights);
            let solution = solve_normal(
                &normal,
                &rhs,
                policy.pivot_tolerance,
                system.column(Unknown::Depth),
            )?;
            if solution.step.iter().any(|x| !x.is_finite()) {
                return Err(HypoError::SingularSystem {
                    unknowns: unknowns.len(),
                });
            }

            let mut step = [0.0; 4];
            for (c, unknown) in unknowns.iter().enumerate() {
                step[unknown.slot()] = solution.step[c];
            }
            let frozen: Vec<Unknown> = solution.frozen.iter().map(|&c| unknowns[c]).collect();

            let damping = self.damping(&step);
            for x in step.iter_mut() {
                *x *= damping;
            }

            let next = builder.evaluate(self.advance(&eval.trial, &step), &observations);
            let rms = eval.rms();
            let rms_after = next.rms();
            let spatial = (step[0].powi(2) + step[1].powi(2) + step[2].powi(2)).sqrt();

            let snapshot = IterationSnapshot {
                iteration,
                latitude: eval.trial.latitude,
                longitude: eval.trial.longitude,
                depth: eval.trial.depth,
                origin_offset: eval.trial.origin,
                rms,
                rms_after,
                step,
                damping,
                observations: eval.usable(),
                depth_frozen: !unknowns.contains(&Unknown::Depth)
                    || frozen.contains(&Unknown::Depth),
                frozen,
                dropped: eval.dropped,
            };
            self.log_iteration(&snapshot);
            history.push(snapshot);

            if next.dropped > 0 {
                warnings.push(SolveWarning::DroppedObservations {
                    iteration,
                    count: next.dropped,
                });
            }
            check_usable(&next)?;

            if rms_after < best.rms() {
                best = next.clone();
                best_index = iteration;
            }
            increases = if rms_after > rms { increases + 1 } else { 0 };

            let settled =
                (rms_after - rms).abs() < policy.rms_tolerance && spatial < policy.step_tolerance;
            eval = next;

            if settled {
                termination = Termination::Converged;
                break;
            }
            if increases >= policy.divergence_limit {
                tracing::warn!(
                    event = label,
                    iteration,
                    best_rms = best.rms(),
                    "RMS rising; rewinding to best trial"
                );
                eval = best.clone();
                termination = Termination::Diverged;
                warnings.push(SolveWarning::Diverged { iteration });
                break;
            }
        }

        if termination == Termination::MaxIterationsReached {
            tracing::warn!(
                event = label,
                iterations = policy.max_iterations,
                "iteration cap reached without convergence"
            );
            warnings.push(SolveWarning::MaxIterationsReached {
                iterations: policy.max_iterations,
            });
        }

        let (horizontal_error, depth_error, depth_frozen) = self.error_estimates(&builder, &eval);
        let iterations = history.len();
        if termination != Termination::Diverged {
            history.push(IterationSnapshot {
                iteration: iterations + 1,
                latitude: eval.trial.latitude,
                longitude: eval.trial.longitude,
                depth: eval.trial.depth,
                origin_offset: eval.trial.origin,
                rms: eval.rms(),
                rms_after: eval.rms(),
                step: [0.0; 4],
                damping: 1.0,
                observations: eval.usable(),
                depth_frozen,
                frozen: Vec::new(),
                dropped: eval.dropped,
            });
            best_index = iterations;
        }

        tracing::info!(
            event = label,
            ?termination,
            iterations,
            latitude = eval.trial.latitude,
            longitude = eval.trial.longitude,
            depth = eval.trial.depth,
            rms = eval.rms(),
            "located event"
        );

        let fit = FinalFit {
            reference,
            observations: &observations,
            evaluation: &eval,
            horizontal_error,
            depth_error,
            depth_frozen,
            termination,
            best: best_index,
        };
        assemble(label, self.control, &fit, history, warnings)
    }

    fn resolve<'p>(
        &'p self,
        phases: &'p [PhaseObservation],
        reference: NaiveDateTime,
    ) -> Result<Vec<Observation<'p>>> {
        phases
            .iter()
            .map(|reading| {
                let station = self
                    .roster
                    .get(&reading.station)
                    .ok_or_else(|| HypoError::UnknownStation(reading.station.clone()))?;
                let arrival = reading.arrival.offset_from(reference).ok_or_else(|| {
                    HypoError::InvalidArrivalTime {
                        station: reading.station.clone(),
                    }
                })?;
                Ok(Observation {
                    station,
                    reading,
                    arrival,
                })
            })
            .collect()
    }

    fn initial_trial(
        &self,
        builder: &DesignBuilder<'_, M>,
        observations: &[Observation<'_>],
    ) -> Result<Trial> {
        let earliest = |max_quality: u8| {
            observations
                .iter()
                .filter(|o| o.reading.quality <= max_quality)
                .min_by(|a, b| a.arrival.total_cmp(&b.arrival))
        };
        let first = earliest(u8::MAX).ok_or(HypoError::InsufficientData {
            required: MIN_OBSERVATIONS,
            usable: 0,
        })?;

        let (latitude, longitude) = match &self.control.initial_epicenter {
            Some(epicenter) => (
                epicenter.latitude.to_decimal(),
                epicenter.longitude.to_decimal(),
            ),
            None => geodesy::displace(
                first.station.latitude.to_decimal(),
                first.station.longitude.to_decimal(),
                0.0,
                START_OFFSET_KM,
            ),
        };
        let depth = self.control.trial_depth;

        let anchor = earliest(1).unwrap_or(first);
        let distance = geodesy::offset(
            latitude,
            longitude,
            anchor.station.latitude.to_decimal(),
            anchor.station.longitude.to_decimal(),
        )
        .distance;
        let travel = builder
            .travel_time(anchor.reading.phase, distance, depth)
            .map_or(0.0, |tt| tt.time);

        Ok(Trial {
            latitude,
            longitude,
            depth,
            origin: anchor.arrival - anchor.station.delay - travel,
        })
    }

    fn free_unknowns(&self, usable: usize) -> Vec<Unknown> {
        if self.control.fixed_depth || usable <= MIN_OBSERVATIONS {
            vec![Unknown::East, Unknown::North, Unknown::OriginTime]
        } else {
            Unknown::ALL.to_vec()
        }
    }

    /// Largest factor `damping_factor^k` that brings the step inside the
    /// horizontal and depth limits.
    fn damping(&self, step: &[f64; 4]) -> f64 {
        let policy = &self.control.policy;
        let horizontal = step[0].hypot(step[1]);
        let vertical = step[2].abs();
        let mut damping = 1.0;
        while horizontal * damping > policy.max_horizontal_step
            || vertical * damping > policy.max_depth_step
        {
            damping *= policy.damping_factor;
        }
        damping
    }

    fn advance(&self, trial: &Trial, step: &[f64; 4]) -> Trial {
        let (latitude, longitude) =
            geodesy::displace(trial.latitude, trial.longitude, step[0], step[1]);
        let mut depth = trial.depth + step[2];
        if depth < 0.0 {
            depth = trial.depth * self.control.policy.depth_reflection;
        }
        Trial {
            latitude,
            longitude,
            depth,
            origin: trial.origin + step[3],
        }
    }

    /// Standard errors at the final trial, plus whether depth ended up
    /// unresolved.
    fn error_estimates(
        &self,
        builder: &DesignBuilder<'_, M>,
        eval: &Evaluation,
    ) -> (Option<f64>, Option<f64>, bool) {
        let unknowns = self.free_unknowns(eval.usable());
        let system = builder.assemble(eval, &unknowns);
        let (normal, rhs) = normal_equations(&system.jacobian, &system.residuals, &system.weights);
        let tolerance = self.control.policy.pivot_tolerance;
        let solution = match solve_normal(&normal, &rhs, tolerance, system.column(Unknown::Depth)) {
            Ok(solution) => solution,
            Err(_) => return (None, None, true),
        };
        let depth_frozen = match system.column(Unknown::Depth) {
            Some(c) => solution.frozen.contains(&c),
            None => true,
        };

        let n = system.rows.len();
        let p = unknowns.len() - solution.frozen.len();
        if n <= p {
            return (None, None, depth_frozen);
        }
        let variance = system
            .residuals
            .iter()
            .zip(system.weights.iter())
            .map(|(r, w)| w * r * r)
            .sum::<f64>()
            / (n - p) as f64;
        let se = standard_errors(&solution.inverse, variance);
        let component = |unknown: Unknown| system.column(unknown).map(|c| se[c]);

        let horizontal = match (component(Unknown::East), component(Unknown::North)) {
            (Some(east), Some(north)) => Some(east.hypot(north)),
            _ => None,
        };
        let depth = if depth_frozen {
            None
        } else {
            component(Unknown::Depth)
        };
        (horizontal, depth, depth_frozen)
    }

    fn log_iteration(&self, snapshot: &IterationSnapshot) {
        if self.control.print_iterations {
            tracing::info!(
                iteration = snapshot.iteration,
                latitude = snapshot.latitude,
                longitude = snapshot.longitude,
                depth = snapshot.depth,
                rms = snapshot.rms,
                rms_after = snapshot.rms_after,
                damping = snapshot.damping,
                frozen = ?snapshot.frozen,
                "iteration"
            );
        } else {
            tracing::debug!(
                iteration = snapshot.iteration,
                latitude = snapshot.latitude,
                longitude = snapshot.longitude,
                depth = snapshot.depth,
                rms = snapshot.rms,
                rms_after = snapshot.rms_after,
                damping = snapshot.damping,
                frozen = ?snapshot.frozen,
                "iteration"
            );
        }
    }
}

impl<'a, M: TravelTimeModel + Sync> Locator<'a, M> {
    /// Locate many events in parallel. Each event's outcome is reported
    /// separately; one event failing does not stop the others.
    ///
    /// # Errors
    /// Returns an error only if the worker pool cannot be built.
    pub fn locate_batch(&self, events: &[Event]) -> Result<Vec<Result<SolveResult>>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.get_num_threads())
            .build()
            .map_err(|e| HypoError::ThreadPool(e.to_string()))?;

        let results: Vec<Result<SolveResult>> = pool.install(|| {
            events
                .par_iter()
                .map(|event| self.locate(&event.label, &event.phases))
                .collect()
        });

        for (event, result) in events.iter().zip(&results) {
            if let Err(e) = result {
                tracing::warn!(event = %event.label, error = %e, "event not located");
            }
        }
        Ok(results)
    }
}

fn check_usable(eval: &Evaluation) -> Result<()> {
    let usable = eval.usable();
    if usable < MIN_OBSERVATIONS {
        return Err(HypoError::InsufficientData {
            required: MIN_OBSERVATIONS,
            usable,
        });
    }
    Ok(())
}

/// Earliest minute among the readings; all arrival offsets are measured
/// from it.
fn reference_minute(phases: &[PhaseObservation]) -> Result<NaiveDateTime> {
    let mut reference: Option<NaiveDateTime> = None;
    for reading in phases {
        let start = reading
            .arrival
            .minute_start()
            .ok_or_else(|| HypoError::InvalidArrivalTime {
                station: reading.station.clone(),
            })?;
        reference = Some(reference.map_or(start, |r| r.min(start)));
    }
    reference.ok_or(HypoError::InsufficientData {
        required: MIN_OBSERVATIONS,
        usable: 0,
    })
}

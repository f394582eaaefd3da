use crate::error::{PwcBatchError, Result};
use crate::models::{
    normalize_region, ApplicationMethod, ApplicationSchedule, AquaticBin, AssessmentType,
    DriftReductionTable, LandscapeParams, RunDefinition, RunId, RunParts, TransportMechanism,
    WaterbodyParams,
};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Depth (cm) at which drift-only runs bury the chemical so no runoff mass is generated.
pub const DRIFT_ONLY_DEPTH_CM: u32 = 8;

/// Which schedule/landscape combinations become runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Pairing {
    /// Every schedule with every landscape, schedule-major.
    #[default]
    CrossProduct,
    /// Caller-chosen (schedule index, landscape index) pairs, in the given order.
    Explicit(Vec<(usize, usize)>),
}

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub chemical: String,
    pub assessment: AssessmentType,
    pub waterbodies: BTreeMap<AquaticBin, WaterbodyParams>,
    pub pairing: Pairing,
    pub drift_table: Option<DriftReductionTable>,
}

impl AssemblyOptions {
    pub fn new(chemical: &str, waterbodies: BTreeMap<AquaticBin, WaterbodyParams>) -> Self {
        Self {
            chemical: chemical.to_string(),
            assessment: AssessmentType::Fifra,
            waterbodies,
            pairing: Pairing::CrossProduct,
            drift_table: None,
        }
    }

    pub fn with_assessment(mut self, assessment: AssessmentType) -> Self {
        self.assessment = assessment;
        self
    }

    pub fn with_pairing(mut self, pairing: Pairing) -> Self {
        self.pairing = pairing;
        self
    }

    pub fn with_drift_table(mut self, table: DriftReductionTable) -> Self {
        self.drift_table = Some(table);
        self
    }
}

/// Joins solved schedules with landscape variants into run definitions.
pub struct BatchAssembler {
    options: AssemblyOptions,
}

impl BatchAssembler {
    pub fn new(options: AssemblyOptions) -> Self {
        Self { options }
    }

    /// Strict assembly: the first incompatible pairing fails the whole call.
    pub fn assemble(
        &self,
        schedules: &[ApplicationSchedule],
        landscapes: &[LandscapeParams],
    ) -> Result<Vec<RunDefinition>> {
        let (runs, mut errors) = self.assemble_partitioned(schedules, landscapes);
        if errors.is_empty() {
            Ok(runs)
        } else {
            Err(errors.remove(0))
        }
    }

    /// Assemble every requested pairing, collecting failures per run instead of stopping.
    ///
    /// Pairing indices address the `schedules` slice; run identifiers use each
    /// schedule's `request_index` so they stay put when other requests fail.
    pub fn assemble_partitioned(
        &self,
        schedules: &[ApplicationSchedule],
        landscapes: &[LandscapeParams],
    ) -> (Vec<RunDefinition>, Vec<PwcBatchError>) {
        let pairs: Vec<(usize, usize)> = match &self.options.pairing {
            Pairing::CrossProduct => (0..schedules.len())
                .flat_map(|s| (0..landscapes.len()).map(move |l| (s, l)))
                .collect(),
            Pairing::Explicit(pairs) => pairs.clone(),
        };

        let mut runs = Vec::with_capacity(pairs.len());
        let mut errors = Vec::new();
        let mut seen: HashSet<RunId> = HashSet::new();

        for (s_idx, l_idx) in pairs {
            let result = match (schedules.get(s_idx), landscapes.get(l_idx)) {
                (Some(schedule), Some(landscape)) => self.build_run(schedule, landscape, l_idx),
                _ => Err(PwcBatchError::AssemblyValidation {
                    run: format!("s{:02}_l{:02}", s_idx, l_idx),
                    reason: format!(
                        "pairing references schedule {} / landscape {} but only {} / {} exist",
                        s_idx,
                        l_idx,
                        schedules.len(),
                        landscapes.len()
                    ),
                }),
            };

            match result {
                Ok(run) if !seen.insert(run.id().clone()) => {
                    errors.push(PwcBatchError::AssemblyValidation {
                        run: run.id().to_string(),
                        reason: "duplicate run identifier".into(),
                    });
                }
                Ok(run) => {
                    debug!(run = %run.id(), name = %run.name(), "assembled run");
                    runs.push(run);
                }
                Err(e) => {
                    warn!("{}", e);
                    errors.push(e);
                }
            }
        }

        (runs, errors)
    }

    fn build_run(
        &self,
        schedule: &ApplicationSchedule,
        landscape: &LandscapeParams,
        landscape_index: usize,
    ) -> Result<RunDefinition> {
        let label = &schedule.label;
        let site = &schedule.site;
        let schedule_index = schedule.request_index;
        let id = RunId::derive(
            &self.options.chemical,
            &site.scenario,
            schedule_index,
            landscape_index,
        );
        let reject = |reason: String| PwcBatchError::AssemblyValidation {
            run: id.to_string(),
            reason,
        };

        let landscape = landscape
            .resolved(self.options.drift_table.as_ref())
            .map_err(|e| reject(e.to_string()))?;
        landscape.validate().map_err(|e| reject(e.to_string()))?;

        let transport = landscape.transport_mechanism;
        if !label.allows(transport) {
            return Err(reject(format!(
                "transport mechanism {} is not allowed by label '{}'",
                transport, label.descriptor
            )));
        }

        let mut waterbody = *self
            .options
            .waterbodies
            .get(&landscape.aquatic_bin)
            .ok_or_else(|| {
                reject(format!(
                    "no waterbody parameters configured for aquatic bin {}",
                    landscape.aquatic_bin
                ))
            })?;
        if self.options.assessment == AssessmentType::Fifra
            && landscape.aquatic_bin == AquaticBin::Static
        {
            waterbody.flow_avg_time = 0.0;
        }
        waterbody
            .validate(landscape.aquatic_bin)
            .map_err(|e| reject(e.to_string()))?;

        let (method, depth, tband) = match transport {
            TransportMechanism::Drift => {
                (ApplicationMethod::AtDepth, Some(DRIFT_ONLY_DEPTH_CM), None)
            }
            _ => (
                label.application_method,
                label.incorporation_depth_cm,
                label.tband_split,
            ),
        };

        let name = format!(
            "{}_huc{}_{}_bin{}_appmeth{}_{}ft_{}_{}",
            label.descriptor,
            normalize_region(&site.region),
            site.scenario,
            landscape.aquatic_bin,
            method.code(),
            landscape.distance_ft,
            transport.code(),
            schedule.prioritization.tag()
        );

        Ok(RunDefinition::from_parts(RunParts {
            id,
            name,
            chemical: self.options.chemical.clone(),
            schedule: schedule.clone(),
            landscape,
            waterbody,
            application_method: method,
            depth_cm: depth,
            tband_split: tband,
            schedule_index,
            landscape_index,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ApplicationEvent, DatePrioritization, LabelRestriction, MonthDay, SiteParams,
    };
    use chrono::NaiveDate;

    fn waterbody() -> WaterbodyParams {
        WaterbodyParams {
            flow_avg_time: 1.0,
            field_size_m2: 100000.0,
            waterbody_area_m2: 10000.0,
            init_depth_m: 2.0,
            max_depth_m: 2.0,
            hydraulic_length_m: 356.8,
            pua: 1.0,
            baseflow: 0.0,
        }
    }

    fn waterbodies() -> BTreeMap<AquaticBin, WaterbodyParams> {
        [AquaticBin::Static, AquaticBin::Flowing]
            .into_iter()
            .map(|bin| (bin, waterbody()))
            .collect()
    }

    fn schedule(label: LabelRestriction, scenario: &str, index: usize) -> ApplicationSchedule {
        ApplicationSchedule {
            label,
            site: SiteParams::new(scenario, "05"),
            prioritization: DatePrioritization::WettestPeriod,
            events: vec![ApplicationEvent::new(
                NaiveDate::from_ymd_opt(1961, 5, 15).unwrap(),
                1.0,
            )],
            request_index: index,
        }
    }

    fn label() -> LabelRestriction {
        LabelRestriction::new(
            "corn",
            MonthDay::new(4, 1).unwrap(),
            MonthDay::new(6, 30).unwrap(),
            3,
            1.0,
            2.5,
        )
    }

    fn landscapes() -> Vec<LandscapeParams> {
        vec![
            LandscapeParams::new(0.0, 0.0, TransportMechanism::Runoff, AquaticBin::Static),
            LandscapeParams::new(
                100.0,
                0.05,
                TransportMechanism::RunoffAndDrift,
                AquaticBin::Flowing,
            ),
        ]
    }

    #[test]
    fn cross_product_is_schedule_major() {
        let assembler = BatchAssembler::new(AssemblyOptions::new("atrazine", waterbodies()));
        let schedules = vec![schedule(label(), "ILCornSTD", 0), schedule(label(), "MNCornSTD", 1)];
        let runs = assembler.assemble(&schedules, &landscapes()).unwrap();

        let ids: Vec<_> = runs.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(
            ids,
            vec![
                "atrazine_ILCornSTD_s00_l00",
                "atrazine_ILCornSTD_s00_l01",
                "atrazine_MNCornSTD_s01_l00",
                "atrazine_MNCornSTD_s01_l01",
            ]
        );
        assert_eq!(
            runs[1].name(),
            "corn_huc05_ILCornSTD_bin7_appmeth2_100ft_RD_pr-wetmonth"
        );
    }

    #[test]
    fn explicit_pairing_preserves_order() {
        let options = AssemblyOptions::new("atrazine", waterbodies())
            .with_pairing(Pairing::Explicit(vec![(0, 1), (0, 0)]));
        let runs = BatchAssembler::new(options)
            .assemble(&[schedule(label(), "ILCornSTD", 0)], &landscapes())
            .unwrap();
        assert_eq!(runs[0].landscape_index(), 1);
        assert_eq!(runs[1].landscape_index(), 0);
    }

    #[test]
    fn disallowed_transport_is_rejected() {
        let runoff_only = label().with_transport(&[TransportMechanism::Runoff]);
        let assembler = BatchAssembler::new(AssemblyOptions::new("atrazine", waterbodies()));
        let err = assembler
            .assemble(&[schedule(runoff_only.clone(), "ILCornSTD", 0)], &landscapes())
            .unwrap_err();
        assert!(matches!(err, PwcBatchError::AssemblyValidation { .. }));
        assert!(err.to_string().contains("RD"));

        let (runs, errors) =
            assembler.assemble_partitioned(&[schedule(runoff_only, "ILCornSTD", 0)], &landscapes());
        assert_eq!(runs.len(), 1);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn drift_only_runs_bury_the_application() {
        let drift = LandscapeParams::new(25.0, 0.2, TransportMechanism::Drift, AquaticBin::Static);
        let assembler = BatchAssembler::new(AssemblyOptions::new("atrazine", waterbodies()));
        let runs = assembler
            .assemble(&[schedule(label(), "ILCornSTD", 0)], &[drift])
            .unwrap();
        assert_eq!(runs[0].application_method(), ApplicationMethod::AtDepth);
        assert_eq!(runs[0].depth_cm(), Some(DRIFT_ONLY_DEPTH_CM));
        assert_eq!(runs[0].landscape().drift_reduction_factor, 0.2);
        assert!(runs[0].name().contains("_appmeth4_25ft_D_"));
    }

    #[test]
    fn fifra_static_bin_zeroes_flow_averaging() {
        let assembler = BatchAssembler::new(AssemblyOptions::new("atrazine", waterbodies()));
        let runs = assembler
            .assemble(&[schedule(label(), "ILCornSTD", 0)], &landscapes())
            .unwrap();
        assert_eq!(runs[0].waterbody().flow_avg_time, 0.0);
        assert_eq!(runs[1].waterbody().flow_avg_time, 1.0);

        let esa =
            AssemblyOptions::new("atrazine", waterbodies()).with_assessment(AssessmentType::Esa);
        let runs = BatchAssembler::new(esa)
            .assemble(&[schedule(label(), "ILCornSTD", 0)], &landscapes())
            .unwrap();
        assert_eq!(runs[0].waterbody().flow_avg_time, 1.0);
    }

    #[test]
    fn missing_waterbody_and_bad_pairing_are_rejected() {
        let wetland =
            LandscapeParams::new(0.0, 0.0, TransportMechanism::Runoff, AquaticBin::Wetland);
        let assembler = BatchAssembler::new(
            AssemblyOptions::new("atrazine", waterbodies())
                .with_pairing(Pairing::Explicit(vec![(0, 0), (3, 0)])),
        );
        let (runs, errors) =
            assembler.assemble_partitioned(&[schedule(label(), "ILCornSTD", 0)], &[wetland]);
        assert!(runs.is_empty());
        assert_eq!(errors.len(), 2);
        assert!(errors
            .iter()
            .all(|e| matches!(e, PwcBatchError::AssemblyValidation { .. })));
    }

    #[test]
    fn duplicate_pairing_is_rejected() {
        let options = AssemblyOptions::new("atrazine", waterbodies())
            .with_pairing(Pairing::Explicit(vec![(0, 0), (0, 0)]));
        let (runs, errors) = BatchAssembler::new(options)
            .assemble_partitioned(&[schedule(label(), "ILCornSTD", 0)], &landscapes());
        assert_eq!(runs.len(), 1);
        assert!(errors[0].to_string().contains("duplicate"));
    }

    #[test]
    fn run_ids_follow_request_index_not_slice_position() {
        let assembler = BatchAssembler::new(AssemblyOptions::new("atrazine", waterbodies()));
        let runs = assembler
            .assemble(&[schedule(label(), "MNCornSTD", 3)], &landscapes())
            .unwrap();
        assert_eq!(runs[0].id().to_string(), "atrazine_MNCornSTD_s03_l00");
        assert_eq!(runs[0].schedule_index(), 3);
    }

    #[test]
    fn drift_profiles_resolve_from_table() {
        let table = DriftReductionTable::new()
            .with_profile("7-AERIAL_M", 0.95, &[(100.0, 0.08)])
            .unwrap();
        let profiled =
            LandscapeParams::new(100.0, 0.0, TransportMechanism::RunoffAndDrift, AquaticBin::Flowing)
                .with_drift_profile("AERIAL_M");
        let unknown =
            LandscapeParams::new(300.0, 0.0, TransportMechanism::RunoffAndDrift, AquaticBin::Flowing)
                .with_drift_profile("AERIAL_M");
        let options = AssemblyOptions::new("atrazine", waterbodies()).with_drift_table(table);
        let (runs, errors) = BatchAssembler::new(options)
            .assemble_partitioned(&[schedule(label(), "ILCornSTD", 0)], &[profiled, unknown]);

        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].landscape().drift_reduction_factor, 0.08);
        assert_eq!(runs[0].landscape().application_efficiency, 0.95);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("300 ft"));
        assert!(errors[0].to_string().contains("s00_l01"));
    }
}

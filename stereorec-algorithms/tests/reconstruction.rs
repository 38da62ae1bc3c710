#![allow(clippy::cast_precision_loss)]
use approx::{assert_abs_diff_eq, assert_relative_eq};
use stereorec_algorithms::{
    AxisImage, DispModels, DispTarget, EmissionHeightEstimator, EventOutcome, EventProcessor,
    HeightPoint, IntersectionReconstructor, TableLayout, TableSet, TreeEnsemble, FEATURE_NAMES,
};
use stereorec_core::geometry::rotate;
use stereorec_core::{
    CutReason, DirectionMethod, EventInput, ImageParameters, McTruth, PerTelescope, Pointing,
    Position, ReconstructionMethod, RunConfig, SpectralWeighting, Telescope, TelescopeArray,
    TelescopeId, TelescopeType, UpstreamReconstruction,
};

const SOURCE: (f64, f64) = (0.0, 0.0);
const CORE: (f64, f64) = (20.0, 40.0);

fn array(positions: &[(f64, f64)], types: &[u64]) -> TelescopeArray {
    TelescopeArray::new(
        positions
            .iter()
            .zip(types)
            .map(|(&(x, y), &t)| Telescope::new(Position::new(x, y, 0.0), 12.0, 3.5, TelescopeType(t)))
            .collect(),
    )
    .unwrap()
}

/// Image of a shower from `SOURCE` landing at `CORE`, seen by a telescope at `tel`.
fn shower_image(tel: (f64, f64)) -> ImageParameters {
    let phi = (CORE.1 - tel.1).atan2(CORE.0 - tel.0);
    ImageParameters::new(
        SOURCE.0 + 0.4 * phi.cos(),
        SOURCE.1 + 0.4 * phi.sin(),
        0.05,
        0.2,
        phi.to_degrees(),
        5000.0,
    )
}

fn event_for(
    array: &TelescopeArray,
    images: Vec<Option<ImageParameters>>,
    upstream_offset: (f64, f64),
) -> EventInput {
    let selected: Vec<TelescopeId> = images
        .iter()
        .enumerate()
        .filter(|(_, image)| image.is_some())
        .map(|(i, _)| TelescopeId(i))
        .collect();
    assert_eq!(images.len(), array.len());
    EventInput {
        run_number: 100,
        event_number: 1,
        time: 0.0,
        pointing: Pointing::zenith(),
        field_rotation: 0.0,
        trigger: selected.clone(),
        images: PerTelescope::from_vec(images),
        reconstructions: vec![UpstreamReconstruction {
            n_images: selected.len(),
            chi2: Some(0.5),
            xoff: Some(upstream_offset.0),
            yoff: Some(upstream_offset.1),
            xcore: Some(CORE.0),
            ycore: Some(CORE.1),
            selected,
        }],
        mc: None,
    }
}

fn empty_tables() -> TableSet {
    TableSet::new(&TableLayout::default())
}

fn unit_model(value: f64) -> Box<TreeEnsemble> {
    Box::new(TreeEnsemble {
        feature_names: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
        base_score: value,
        trees: Vec::new(),
    })
}

#[test]
fn test_emission_height_pair_symmetry() {
    let estimator = EmissionHeightEstimator::default();
    let a = HeightPoint {
        id: TelescopeId(0),
        shower_x: -35.0,
        shower_y: 12.0,
        cen_x: 0.31,
        cen_y: -0.2,
        size: 812.0,
    };
    let b = HeightPoint {
        id: TelescopeId(3),
        shower_x: 90.0,
        shower_y: -41.0,
        cen_x: -0.52,
        cen_y: 0.44,
        size: 15_300.0,
    };
    let forward = estimator.pair_height(&a, &b).unwrap();
    let backward = estimator.pair_height(&b, &a).unwrap();
    assert_relative_eq!(forward.0, backward.0, max_relative = 1e-14);
    assert_relative_eq!(forward.1, backward.1, max_relative = 1e-14);
}

#[test]
fn test_emission_height_needs_two_images() {
    let estimator = EmissionHeightEstimator::default();
    let only = HeightPoint {
        id: TelescopeId(0),
        shower_x: 0.0,
        shower_y: 0.0,
        cen_x: 0.3,
        cen_y: 0.1,
        size: 2000.0,
    };
    let result = estimator.estimate(&[only]);
    assert!(result.mean.is_none());
    assert!(result.chi2.is_none());
    assert_eq!(result.n_pairs, 0);
    assert!(estimator.estimate(&[]).mean.is_none());
}

#[test]
fn test_direction_rotates_with_pointing() {
    let tels = [(0.0, 0.0), (120.0, 10.0), (-60.0, 90.0)];
    let source = (0.3, -0.2);
    let reconstructor = IntersectionReconstructor::default();

    let build = |azimuth: f64| {
        let pointing = Pointing::new(azimuth, 90.0);
        let images: Vec<AxisImage> = tels
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| {
                let phi = (CORE.1 - y).atan2(CORE.0 - x).to_degrees();
                let (cx, cy) = rotate(source.0 + 0.4 * phi.to_radians().cos(), source.1 + 0.4 * phi.to_radians().sin(), azimuth);
                let image = ImageParameters::new(cx, cy, 0.05, 0.2, phi + azimuth, 5000.0);
                let shower = pointing.ground_to_shower(Position::new(x, y, 0.0));
                AxisImage::new(TelescopeId(i), &image, shower)
            })
            .collect();
        reconstructor.reconstruct(&images, &pointing).unwrap()
    };

    let reference = build(0.0);
    for azimuth in [17.0, 90.0, 233.0] {
        let rotated = build(azimuth);
        let (ex, ey) = rotate(reference.xoff, reference.yoff, azimuth);
        assert_abs_diff_eq!(rotated.xoff, ex, epsilon = 1e-9);
        assert_abs_diff_eq!(rotated.yoff, ey, epsilon = 1e-9);
        let (x0, y0) = reference.core.unwrap();
        let (x1, y1) = rotated.core.unwrap();
        assert_abs_diff_eq!(x0, x1, epsilon = 1e-6);
        assert_abs_diff_eq!(y0, y1, epsilon = 1e-6);
    }
}

#[test]
fn test_two_telescope_event_end_to_end() {
    let array = array(&[(0.0, 0.0), (100.0, 0.0)], &[1, 1]);
    let config = RunConfig::default().with_method(ReconstructionMethod::Intersection);
    let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();
    let images = vec![
        Some(ImageParameters::new(0.5, 0.5, 0.05, 0.2, 45.0, 5000.0)),
        Some(ImageParameters::new(-0.5, 0.5, 0.05, 0.2, 135.0, 5000.0)),
    ];
    let input = event_for(&array, images, (9.0, 9.0));

    let EventOutcome::Accepted(record) = processor.process(&input).unwrap() else {
        panic!("two-telescope event should be reconstructed");
    };
    assert!(record.direction.xoff.is_finite() && record.direction.yoff.is_finite());
    assert!(record.xcore.is_finite() && record.ycore.is_finite());
    assert_abs_diff_eq!(record.xcore, 50.0, epsilon = 1e-6);
    assert_abs_diff_eq!(record.ycore, 50.0, epsilon = 1e-6);
    assert!(record.emission_height.n_pairs >= 1);
    assert_eq!(record.core_distance.count_present(), 2);
    assert_abs_diff_eq!(
        *record.core_distance.get(TelescopeId(0)).unwrap(),
        50.0_f64.hypot(50.0),
        epsilon = 1e-6
    );
}

#[test]
fn test_disp_skips_types_without_model() {
    let tels = [(0.0, 0.0), (120.0, 10.0), (-60.0, 90.0)];
    // third telescope is of a type with no trained model
    let array = array(&tels, &[1, 1, 2]);
    let mut models = DispModels::new();
    models
        .insert(DispTarget::Direction, TelescopeType(1), unit_model(0.4))
        .unwrap();
    assert_eq!(
        models.missing_direction_types(array.types()),
        vec![TelescopeType(2)]
    );

    let config = RunConfig::default().with_method(ReconstructionMethod::Disp);
    let mut processor = EventProcessor::new(&array, &config, empty_tables())
        .unwrap()
        .with_disp_models(&models);
    let images = tels.iter().map(|&t| Some(shower_image(t))).collect();
    let input = event_for(&array, images, (0.7, 0.7));

    let EventOutcome::Accepted(record) = processor.process(&input).unwrap() else {
        panic!("disp event should be reconstructed");
    };
    assert_eq!(record.direction.method, DirectionMethod::Disp);
    let disp = record.disp.unwrap();
    assert_eq!(disp.n_contributing, 2);
    assert_abs_diff_eq!(disp.xoff.unwrap(), SOURCE.0, epsilon = 1e-9);
    assert_abs_diff_eq!(disp.yoff.unwrap(), SOURCE.1, epsilon = 1e-9);
    assert!(record.images.get(TelescopeId(2)).unwrap().disp.is_none());
    assert_abs_diff_eq!(record.images.get(TelescopeId(0)).unwrap().disp.unwrap(), 0.4);
}

#[test]
fn test_disp_without_any_model_falls_back_to_intersection() {
    let tels = [(0.0, 0.0), (120.0, 10.0)];
    let array = array(&tels, &[5, 5]);
    let models = DispModels::new();
    let config = RunConfig::default().with_method(ReconstructionMethod::Disp);
    let mut processor = EventProcessor::new(&array, &config, empty_tables())
        .unwrap()
        .with_disp_models(&models);
    let images = tels.iter().map(|&t| Some(shower_image(t))).collect();
    let input = event_for(&array, images, (0.7, 0.7));

    let EventOutcome::Accepted(record) = processor.process(&input).unwrap() else {
        panic!("event should fall back to the intersection result");
    };
    assert_eq!(record.direction.method, DirectionMethod::Intersection);
    assert_eq!(record.disp.unwrap().n_contributing, 0);
    assert_abs_diff_eq!(record.direction.xoff, SOURCE.0, epsilon = 1e-9);
}

#[test]
fn test_disp_tolerates_missing_upstream_core() {
    let tels = [(0.0, 0.0), (120.0, 10.0), (-60.0, 90.0)];
    let array = array(&tels, &[1, 1, 1]);
    let mut models = DispModels::new();
    models
        .insert(DispTarget::Direction, TelescopeType(1), unit_model(0.4))
        .unwrap();
    let config = RunConfig::default().with_method(ReconstructionMethod::Disp);
    let mut processor = EventProcessor::new(&array, &config, empty_tables())
        .unwrap()
        .with_disp_models(&models);

    let images = tels.iter().map(|&t| Some(shower_image(t))).collect();
    let mut input = event_for(&array, images, (0.7, 0.7));
    input.reconstructions[0].xcore = Some(f64::NAN);
    input.reconstructions[0].ycore = Some(f64::NAN);

    let outcome = processor.process(&input).unwrap();
    let EventOutcome::Accepted(record) = outcome else {
        panic!("redone geometry must replace the upstream core, got {outcome:?}");
    };
    assert_eq!(record.direction.method, DirectionMethod::Disp);
    assert_abs_diff_eq!(record.xcore, CORE.0, epsilon = 1e-6);
    assert_abs_diff_eq!(record.ycore, CORE.1, epsilon = 1e-6);

    // the upstream method has nothing to replace it with
    let config = RunConfig::default();
    let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();
    assert_eq!(
        processor.process(&input).unwrap(),
        EventOutcome::Rejected(CutReason::CoreInvalid)
    );
}

#[test]
fn test_cut_counters_are_monotonic_and_balanced() {
    let tels = [(0.0, 0.0), (120.0, 10.0), (-60.0, 90.0)];
    let array = array(&tels, &[1, 1, 1]);
    let config = RunConfig::default()
        .with_subsampling(1234, 0.7)
        .with_max_wobble(1.0);
    let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();

    let mut previous = processor.cut_statistics().clone();
    for n in 0..200_u64 {
        let images: Vec<Option<ImageParameters>> = tels.iter().map(|&t| Some(shower_image(t))).collect();
        let mut input = event_for(&array, images, (0.2, 0.1));
        input.event_number = n;
        input.time = n as f64 * 0.01;
        match n % 5 {
            0 => input.reconstructions[0].n_images = 1,
            1 => input.reconstructions[0].chi2 = None,
            2 => input.reconstructions[0].xoff = Some(3.0),
            3 => input.reconstructions[0].xcore = Some(f64::NAN),
            _ => {}
        }
        let outcome = processor.process(&input).unwrap();
        assert_ne!(outcome, EventOutcome::Stop);

        let stats = processor.cut_statistics();
        assert_eq!(stats.total, previous.total + 1);
        assert!(stats.survived >= previous.survived);
        for reason in CutReason::ALL {
            assert!(stats.rejected_by(reason) >= previous.rejected_by(reason));
        }
        assert!(stats.is_consistent());
        previous = stats.clone();
    }
    assert!(previous.rejected_by(CutReason::RandomThinning) > 0);
    assert!(previous.rejected_by(CutReason::Multiplicity) > 0);
    assert!(previous.rejected_by(CutReason::Convergence) > 0);
    assert!(previous.rejected_by(CutReason::WobbleOffset) > 0);
    assert!(previous.rejected_by(CutReason::CoreInvalid) > 0);
    assert!(previous.survived > 0);
}

#[test]
fn test_subsampling_is_reproducible() {
    let tels = [(0.0, 0.0), (120.0, 10.0)];
    let array = array(&tels, &[1, 1]);
    let config = RunConfig::default().with_subsampling(99, 0.5);
    let run = || {
        let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();
        (0..50)
            .map(|n| {
                let images = tels.iter().map(|&t| Some(shower_image(t))).collect();
                let mut input = event_for(&array, images, (0.1, 0.1));
                input.event_number = n;
                matches!(processor.process(&input).unwrap(), EventOutcome::Accepted(_))
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), run());
}

#[test]
fn test_wobble_cut_exempts_single_image_events() {
    let tels = [(0.0, 0.0), (120.0, 10.0)];
    let array = array(&tels, &[1, 1]);
    let config = RunConfig::default().with_min_images(1).with_max_wobble(0.5);
    let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();

    let single = event_for(&array, vec![Some(shower_image(tels[0])), None], (1.0, 0.0));
    let outcome = processor.process(&single).unwrap();
    let EventOutcome::Accepted(record) = outcome else {
        panic!("single-image event must pass the wobble cut, got {outcome:?}");
    };
    assert_eq!(record.n_images(), 1);

    let pair = event_for(
        &array,
        vec![Some(shower_image(tels[0])), Some(shower_image(tels[1]))],
        (1.0, 0.0),
    );
    assert_eq!(
        processor.process(&pair).unwrap(),
        EventOutcome::Rejected(CutReason::WobbleOffset)
    );
}

#[test]
fn test_wobble_exemption_follows_geometry_multiplicity() {
    let tels = [(0.0, 0.0), (120.0, 10.0)];
    let array = array(&tels, &[1, 1]);
    let config = RunConfig::default().with_min_images(1).with_max_wobble(0.5);
    let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();

    // upstream direction fitted from two images, one of which is unusable here
    let mut broken = shower_image(tels[1]);
    broken.fit_status = -1;
    let input = event_for(&array, vec![Some(shower_image(tels[0])), Some(broken)], (1.0, 0.0));
    assert_eq!(input.reconstructions[0].n_images, 2);
    assert_eq!(
        processor.process(&input).unwrap(),
        EventOutcome::Rejected(CutReason::WobbleOffset)
    );
}

#[test]
fn test_event_weight_follows_spectrum() {
    let tels = [(0.0, 0.0), (120.0, 10.0)];
    let array = array(&tels, &[1, 1]);
    let weighting = SpectralWeighting::new(2.0, 2.5, 0.05, 100.0).unwrap();
    let config = RunConfig::default().with_spectral_weighting(weighting);
    let mut processor = EventProcessor::new(&array, &config, empty_tables()).unwrap();

    for energy in [0.01, 0.05, 1.0, 100.0, 300.0] {
        let images = tels.iter().map(|&t| Some(shower_image(t))).collect();
        let mut input = event_for(&array, images, (0.1, 0.1));
        input.mc = Some(McTruth {
            energy,
            xcore: CORE.0,
            ycore: CORE.1,
            ..McTruth::default()
        });
        let EventOutcome::Accepted(record) = processor.process(&input).unwrap() else {
            panic!("event should be accepted");
        };
        assert_relative_eq!(record.weight, weighting.weight(energy), max_relative = 1e-12);
    }
    assert_relative_eq!(
        weighting.weight(0.05),
        weighting.power_law_ratio(0.05),
        max_relative = 1e-12
    );
    assert_relative_eq!(
        weighting.weight(100.0),
        weighting.power_law_ratio(100.0),
        max_relative = 1e-12
    );
    let (summary, _) = processor.finish();
    assert!(summary.dead_time.is_none());
    assert!(summary.mc_histograms.energy_all.integral() > 0.0);
}

//! End-to-end tests for the forecasting pipeline

#[cfg(test)]
mod tests {
    use mockall::mock;
    use stocksense::config::AppConfig;
    use stocksense::data::{read_csv, synthetic};
    use stocksense::ensemble::EnsembleTier;
    use stocksense::forecast::{build_models, ForecastModel};
    use stocksense::prediction::{PredictionService, TrainingPeriod};
    use stocksense::regime::{Regime, RegimeClassifier};
    use stocksense::types::{ForecastResult, ForecastTier, ModelKind, OhlcvSeries};
    use stocksense::ForecastError;

    mock! {
        pub Model {}
        impl ForecastModel for Model {
            fn kind(&self) -> ModelKind;
            fn forecast(&self, series: &OhlcvSeries, horizon: usize) -> stocksense::Result<ForecastResult>;
        }
    }

    fn real_models_except(skip: ModelKind, config: &AppConfig) -> Vec<Box<dyn ForecastModel>> {
        let kinds: Vec<ModelKind> = ModelKind::ALL.into_iter().filter(|k| *k != skip).collect();
        build_models(&kinds, config)
    }

    fn sample_series() -> Vec<(&'static str, OhlcvSeries)> {
        vec![
            ("uptrend", synthetic::uptrend(300, 1)),
            ("downtrend", synthetic::downtrend(300, 2)),
            ("range", synthetic::range_bound(150, 3)),
            ("short", synthetic::uptrend(45, 4)),
            ("tiny", synthetic::downtrend(5, 5)),
        ]
    }

    // ============================================================================
    // Regime classification
    // ============================================================================

    #[test]
    fn test_classify_is_bounded_for_all_inputs() {
        let classifier = RegimeClassifier::default();
        for (name, series) in sample_series() {
            let info = classifier.classify(&series);
            assert!(
                (0.0..=1.0).contains(&info.confidence),
                "{name}: confidence {}",
                info.confidence
            );
            assert_eq!(info.annotated_series.len(), series.len());
        }
    }

    #[test]
    fn test_short_history_is_unknown() {
        // shorter than long_window + atr_window
        let series = synthetic::uptrend(50, 9);
        let classifier = RegimeClassifier::default();
        let first = classifier.classify(&series);
        assert_eq!(first.regime, Regime::Unknown);
        assert_eq!(first.confidence, 0.0);
        assert!(!first.regime_change);
        assert_eq!(first.duration, 0);
        assert_eq!(classifier.classify(&series), first);
    }

    // ============================================================================
    // Model output contract
    // ============================================================================

    #[test]
    fn test_every_model_honors_output_contract() {
        let config = AppConfig::default();
        let horizon = 12;
        for (name, series) in sample_series() {
            for model in build_models(&ModelKind::ALL, &config) {
                let kind = model.kind();
                let result = model
                    .forecast(&series, horizon)
                    .unwrap_or_else(|e| panic!("{name}/{kind}: {e}"));
                assert_eq!(result.model, kind);
                assert_eq!(result.predictions.len(), horizon, "{name}/{kind}");
                assert_eq!(result.confidences.len(), horizon, "{name}/{kind}");
                assert!(
                    result.predictions.iter().all(|p| p.is_finite() && *p >= 0.0),
                    "{name}/{kind}: {:?}",
                    result.predictions
                );
                assert!(
                    result.confidences.iter().all(|c| (0.0..=1.0).contains(c)),
                    "{name}/{kind}: {:?}",
                    result.confidences
                );
                assert!(
                    result.confidences.windows(2).all(|w| w[1] <= w[0] + 1e-12),
                    "{name}/{kind}: confidences increase {:?}",
                    result.confidences
                );
            }
        }
    }

    #[test]
    fn test_quadratic_confidence_is_constant() {
        let series = synthetic::uptrend(120, 3);
        let models = build_models(&[ModelKind::Quadratic], &AppConfig::default());
        let result = models[0].forecast(&series, 10).unwrap();
        assert!(result.confidences.iter().all(|c| *c == result.confidences[0]));
    }

    #[test]
    fn test_tiny_series_uses_fallback_tiers() {
        let series = synthetic::uptrend(8, 1);
        let models = build_models(&ModelKind::ALL, &AppConfig::default());
        for model in &models {
            let result = model.forecast(&series, 5).unwrap();
            match model.kind() {
                ModelKind::Linear | ModelKind::Autoregressive | ModelKind::TimeSeries => {
                    assert_eq!(result.tier, ForecastTier::Fallback, "{}", model.kind())
                }
                ModelKind::Quadratic | ModelKind::Spectral => {
                    assert_eq!(result.tier, ForecastTier::Primary, "{}", model.kind())
                }
            }
        }
    }

    // ============================================================================
    // Full pipeline
    // ============================================================================

    #[test]
    fn test_weights_sum_to_one_every_day() {
        let series = synthetic::uptrend(300, 7);
        for regime_aware in [true, false] {
            let mut config = AppConfig::default();
            config.ensemble.regime_aware = regime_aware;
            let report = PredictionService::new(config)
                .predict_with_horizon(&series, 20)
                .unwrap();
            assert_eq!(report.ensemble.tier, EnsembleTier::Weighted);
            for day in 0..20 {
                let sum: f64 = report.ensemble.weights.row(day).sum();
                assert!((sum - 1.0).abs() < 1e-6, "day {day}: {sum}");
            }
            assert!(report.ensemble.predictions.iter().all(|p| *p >= 0.0));
        }
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let series = synthetic::downtrend(250, 11);
        let service = PredictionService::new(AppConfig::default());
        let a = service.predict_with_horizon(&series, 15).unwrap();
        let b = service.predict_with_horizon(&series, 15).unwrap();
        assert_eq!(a.forecasts, b.forecasts);
        assert_eq!(a.ensemble, b.ensemble);
        assert_eq!(a.regime, b.regime);
        assert_eq!(a.signal, b.signal);
    }

    #[test]
    fn test_uptrend_scenario() {
        let series = synthetic::uptrend(400, 42);
        // the raw low-pass bends the spectral path down at the series end
        let mut config = AppConfig::default();
        config.models.spectral_detrend = true;
        let report = PredictionService::new(config)
            .predict_with_horizon(&series, 30)
            .unwrap();
        assert_eq!(report.regime.regime, Regime::TrendingUp);
        assert!(report.regime.confidence > 0.5);
        assert_eq!(report.ensemble.horizon(), 30);
        assert!(report.ensemble.predictions[29] > report.ensemble.predictions[0]);
        assert!(report.metrics.price_change_pct > 0.0);
        assert_eq!(report.preferred_models, Regime::TrendingUp.preferred_models().to_vec());
    }

    #[test]
    fn test_uptrend_raw_spectral_path_turns_down() {
        let series = synthetic::uptrend(400, 42);
        let report = PredictionService::new(AppConfig::default())
            .predict_with_horizon(&series, 30)
            .unwrap();
        assert_eq!(report.regime.regime, Regime::TrendingUp);
        assert_eq!(report.ensemble.tier, EnsembleTier::Weighted);
        let spectral = report.forecast(ModelKind::Spectral).unwrap();
        assert_eq!(spectral.tier, ForecastTier::Primary);
        assert!(spectral.predictions[29] < spectral.predictions[0]);
        assert!(spectral.confidences[0] < 0.99);
        assert!(report.ensemble.predictions.iter().all(|p| *p > 0.5 * series.last_close()));
    }

    #[test]
    fn test_range_bound_scenario() {
        let series = synthetic::range_bound(200, 3);
        let report = PredictionService::new(AppConfig::default())
            .predict_with_horizon(&series, 15)
            .unwrap();
        assert_eq!(report.regime.regime, Regime::RangeBound);
        let spectral = report.forecast(ModelKind::Spectral).unwrap();
        let linear = report.forecast(ModelKind::Linear).unwrap();
        assert!(
            spectral.confidences[0] > linear.confidences[0],
            "spectral {} vs linear {}",
            spectral.confidences[0],
            linear.confidences[0]
        );
    }

    #[test]
    fn test_failing_model_does_not_fail_ensemble() {
        let config = AppConfig::default();
        let mut failing = MockModel::new();
        failing.expect_kind().return_const(ModelKind::Autoregressive);
        failing
            .expect_forecast()
            .returning(|_, _| Err(ForecastError::fit(ModelKind::Autoregressive, "singular matrix")));

        let mut models = real_models_except(ModelKind::Autoregressive, &config);
        models.push(Box::new(failing));
        let service = PredictionService::with_models(config, models);

        let series = synthetic::uptrend(250, 3);
        let report = service.predict_with_horizon(&series, 10).unwrap();
        assert_eq!(report.ensemble.predictions.len(), 10);
        assert_eq!(report.ensemble.tier, EnsembleTier::Weighted);

        let arima = report.forecast(ModelKind::Autoregressive).unwrap();
        assert_eq!(arima.tier, ForecastTier::Substitute);
        assert_eq!(arima.predictions, vec![series.last_close(); 10]);
        assert!(arima.confidences.iter().all(|c| *c == 0.2));
        assert!(report.warnings.iter().any(|w| w.source == "arima"));
    }

    #[test]
    fn test_malformed_model_output_is_substituted() {
        let config = AppConfig::default();
        let mut short = MockModel::new();
        short.expect_kind().return_const(ModelKind::Spectral);
        short.expect_forecast().returning(|s, _| {
            Ok(ForecastResult::new(
                ModelKind::Spectral,
                vec![s.last_close(); 2],
                vec![0.9; 2],
                ForecastTier::Primary,
            ))
        });
        let mut models = real_models_except(ModelKind::Spectral, &config);
        models.push(Box::new(short));

        let report = PredictionService::with_models(config, models)
            .predict_with_horizon(&synthetic::uptrend(200, 8), 7)
            .unwrap();
        assert_eq!(report.forecast(ModelKind::Spectral).unwrap().tier, ForecastTier::Substitute);
        assert_eq!(report.ensemble.tier, EnsembleTier::Weighted);
    }

    #[test]
    fn test_outlier_model_is_contained() {
        let config = AppConfig::default();
        let mut wild = MockModel::new();
        wild.expect_kind().return_const(ModelKind::Quadratic);
        wild.expect_forecast().returning(|s, h| {
            Ok(ForecastResult::new(
                ModelKind::Quadratic,
                vec![s.last_close() * 10.0; h],
                vec![0.9; h],
                ForecastTier::Primary,
            ))
        });
        let mut models = real_models_except(ModelKind::Quadratic, &config);
        models.push(Box::new(wild));

        let series = synthetic::uptrend(250, 6);
        let last = series.last_close();
        let report = PredictionService::with_models(config, models)
            .predict_with_horizon(&series, 10)
            .unwrap();

        let quad = report.forecast(ModelKind::Quadratic).unwrap();
        assert!(quad.rescaled);
        assert!(quad.confidences.iter().all(|c| (*c - 0.45).abs() < 1e-12));
        assert!(report.ensemble.predictions.iter().all(|p| *p <= 2.0 * last));
        assert!(report.warnings.iter().any(|w| w.tier == "rescaled"));
    }

    #[test]
    fn test_structural_errors_reach_caller() {
        let service = PredictionService::new(AppConfig::default());
        let series = synthetic::uptrend(100, 1);
        assert_eq!(
            service.predict_with_horizon(&series, 0).unwrap_err(),
            ForecastError::InvalidHorizon(0)
        );
        assert_eq!(OhlcvSeries::new(vec![]).unwrap_err(), ForecastError::EmptySeries);
    }

    #[test]
    fn test_training_period_and_csv_input() {
        let source = synthetic::uptrend(400, 12);
        let mut csv = String::from("Date,Open,High,Low,Close,Adj Close,Volume\n");
        for b in source.bars() {
            csv.push_str(&format!(
                "{},{},{},{},{},{},{}\n",
                b.date, b.open, b.high, b.low, b.close, b.close, b.volume
            ));
        }
        let series = read_csv(csv.as_bytes()).unwrap();
        assert_eq!(series, source);

        let mut config = AppConfig::default();
        config.prediction.training_period = TrainingPeriod::SixMonths;
        config.prediction.horizon = 10;
        let report = PredictionService::new(config).predict(&series).unwrap();
        assert!(report.bars_used < series.len());
        assert_eq!(report.last_date, series.last_date());
        assert_eq!(report.forecast_dates.len(), 10);
        assert!(report.trajectory.is_some());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["training_period"], "6m");
        assert_eq!(json["ensemble"]["tier"], "weighted");
    }
}

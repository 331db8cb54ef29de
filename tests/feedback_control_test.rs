// ==========================================
// 质量反馈控制测试
// ==========================================
// 职责: 验证 PID 积分窗口、积分限幅、回路隔离与配置覆写
// ==========================================


#[cfg(test)]
mod feedback_control_test {
    use nc_machining_mes::api::RecordInspectionRequest;
    use nc_machining_mes::app::AppState;
    use nc_machining_mes::config::{config_keys, ConfigManager};
    use nc_machining_mes::db::open_shared_connection;
    use nc_machining_mes::domain::{
        CorrectiveActionKind, FeedbackOutcome, Inspection, MeasurementResult, NcProgram,
    };
    use nc_machining_mes::engine::{FeedbackConfig, FeedbackRepositories, QualityFeedbackController};

    use crate::test_helpers::*;

    const EPS: f64 = 1e-9;

    struct Loop {
        controller: QualityFeedbackController,
        repos: FeedbackRepositories,
        program: NcProgram,
        _temp_file: tempfile::NamedTempFile,
    }

    fn setup(config: FeedbackConfig) -> Loop {
        let (temp_file, db_path) = create_test_db().unwrap();
        let repos = FeedbackRepositories::from_connection(open_shared_connection(&db_path).unwrap());
        let program = NcProgram::new("op-loop", "1.0", LATHE_PROGRAM, vec!["lathe".into()], "planner");
        repos.program_repo.save(&program).unwrap();
        Loop {
            controller: QualityFeedbackController::new(repos.clone(), config),
            repos,
            program,
            _temp_file: temp_file,
        }
    }

    fn inspect(l: &Loop, program_id: Option<&str>, order_id: &str, cpk: f64) -> FeedbackOutcome {
        let mut inspection = Inspection::new(order_id, "LOT-PID", "qa");
        inspection.nc_program_id = program_id.map(String::from);
        inspection.supplied_cpk = Some(cpk);
        inspection.add_measurement(MeasurementResult::evaluate("diameter", 40.0, 40.0, 0.02, "mm"));
        inspection.complete();
        l.repos.inspection_repo.save(&inspection).unwrap();
        l.controller.apply_quality_feedback(&inspection.id).unwrap()
    }

    fn correction_of(outcome: &FeedbackOutcome) -> f64 {
        match outcome {
            FeedbackOutcome::Applied { correction, .. } => *correction,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_history_window_limits_integral() {
        let l = setup(FeedbackConfig {
            history_window: 2,
            ..FeedbackConfig::default()
        });
        let pid = Some(l.program.id.as_str());
        for _ in 0..3 {
            inspect(&l, pid, "order-PO-1", 1.37);
        }
        // 窗口内只有最近两条 0.3: P 0.2 + I 0.1·0.6 + D 0.05·0.1
        let outcome = inspect(&l, pid, "order-PO-1", 1.27);
        assert!((correction_of(&outcome) - 0.265).abs() < EPS);
    }

    #[test]
    fn test_integral_is_clamped() {
        let l = setup(FeedbackConfig {
            integral_clamp: 0.5,
            ..FeedbackConfig::default()
        });
        let pid = Some(l.program.id.as_str());
        for _ in 0..3 {
            inspect(&l, pid, "order-PO-2", 1.37);
        }
        // 误差和 0.9 被限幅到 0.5
        let outcome = inspect(&l, pid, "order-PO-2", 1.27);
        assert!((correction_of(&outcome) - 0.255).abs() < EPS);
    }

    #[test]
    fn test_negative_error_reverses_tool_offset() {
        let l = setup(FeedbackConfig::default());
        let outcome = inspect(&l, Some(&l.program.id), "order-PO-3", 2.0);
        match outcome {
            FeedbackOutcome::Applied {
                error,
                correction,
                action,
                ..
            } => {
                assert!(error < 0.0);
                assert_eq!(action.kind, CorrectiveActionKind::ToolOffsetAdjustment);
                assert!((correction - 0.5 * error).abs() < EPS);
                assert!(action.parameter("wear_offset") < 0.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_loops_are_isolated() {
        let l = setup(FeedbackConfig::default());
        let other = NcProgram::new("op-other", "1.0", MILL_PROGRAM, vec!["mill".into()], "planner");
        l.repos.program_repo.save(&other).unwrap();

        inspect(&l, Some(&l.program.id), "order-PO-4", 1.27);
        // 另一回路的首次反馈不受前一回路历史影响
        let outcome = inspect(&l, Some(&other.id), "order-PO-5", 1.37);
        assert!((correction_of(&outcome) - 0.15).abs() < EPS);

        assert_eq!(l.controller.list_control_history(&l.program.id).unwrap().len(), 1);
        assert_eq!(l.controller.list_control_history(&other.id).unwrap().len(), 1);
    }

    #[test]
    fn test_order_key_when_no_program_resolves() {
        let l = setup(FeedbackConfig::default());
        let outcome = inspect(&l, None, "order-PO-6", 1.5);
        match &outcome {
            FeedbackOutcome::Applied { action, .. } => {
                assert_eq!(action.kind, CorrectiveActionKind::CuttingConditionTuning);
                assert!(action.nc_program_id.is_none());
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let history = l.controller.list_control_history("order:order-PO-6").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].loop_key, "order:order-PO-6");
    }

    #[test]
    fn test_dead_band_boundary_records_nothing() {
        let l = setup(FeedbackConfig::default());
        let outcome = inspect(&l, Some(&l.program.id), "order-PO-7", 1.67);
        match outcome {
            FeedbackOutcome::WithinDeadBand { error, .. } => assert!(error.abs() < EPS),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(l.controller.list_control_history(&l.program.id).unwrap().is_empty());
        assert!(l
            .controller
            .list_tool_offset_adjustments(&l.program.id)
            .unwrap()
            .is_empty());
    }

    // ==========================================
    // 配置覆写经由 AppState 生效
    // ==========================================
    #[tokio::test]
    async fn test_config_override_changes_gain() {
        let (_temp_file, db_path) = create_test_db().unwrap();
        {
            let manager = ConfigManager::new(&db_path).unwrap();
            manager.set_global_config_value(config_keys::FEEDBACK_KP, "1.0").unwrap();
        }
        let state = AppState::new(db_path).await.unwrap();
        assert_eq!(state.feedback_api.get_feedback_config().gains.kp, 1.0);

        let program = register_program(&state, "op-kp", LATHE_PROGRAM, "lathe");
        let mut request =
            RecordInspectionRequest::new("order-PO-8", "LOT-KP", "qa", vec![diameter(40.0)]);
        request.nc_program_id = Some(program.id.clone());
        request.supplied_cpk = Some(1.37);

        let (_, handle) = state.quality_api.record_and_dispatch(request).unwrap();
        let outcome = handle.expect("dispatcher configured").outcome().await.unwrap();
        assert!((correction_of(&outcome) - 0.3).abs() < EPS);
    }
}

// ==========================================
// 生产订单状态机测试
// ==========================================
// 职责: 验证订单状态转换、输入校验与生产事件
// ==========================================


#[cfg(test)]
mod production_order_test {
    use chrono::{Duration, Utc};
    use nc_machining_mes::api::{ApiError, ScheduleProductionRequest};
    use nc_machining_mes::app::AppState;
    use nc_machining_mes::domain::ProductionOrderStatus;
    use nc_machining_mes::engine::{
        ErrorCategory, ProductionEvent, ProductionEventPublisher, ProductionEventType,
    };
    use std::error::Error;
    use std::sync::{Arc, Mutex};

    use crate::test_helpers::*;

    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<ProductionEvent>>,
    }

    impl ProductionEventPublisher for RecordingPublisher {
        fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
            let mut events = self.events.lock().map_err(|e| e.to_string())?;
            events.push(event);
            Ok(format!("evt-{}", events.len()))
        }
    }

    async fn app_with_recorder() -> (tempfile::NamedTempFile, AppState, Arc<RecordingPublisher>) {
        let (temp_file, db_path) = create_test_db().unwrap();
        let recorder = Arc::new(RecordingPublisher::default());
        let state = AppState::with_event_publisher(db_path, Some(recorder.clone()))
            .await
            .unwrap();
        (temp_file, state, recorder)
    }

    #[tokio::test]
    async fn test_lifecycle_emits_events() {
        let (_temp_file, state, recorder) = app_with_recorder().await;

        let order = schedule_order(&state, "PO-EVT-1", &[]);
        state.production_api.delay_order(&order.id).unwrap();
        state.production_api.cancel_order(&order.id).unwrap();

        let types: Vec<ProductionEventType> = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                ProductionEventType::ProductionOrderCreated,
                ProductionEventType::ProductionOrderDelayed,
                ProductionEventType::ProductionOrderCancelled,
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_transitions_leave_status_untouched() {
        let (_temp_file, state, recorder) = app_with_recorder().await;
        let order = schedule_order(&state, "PO-SM-1", &[]);

        // Planned 不能直接完工
        let err = state.production_api.complete_order(&order.id).unwrap_err();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(
            state.production_api.get_order(&order.id).unwrap().status,
            ProductionOrderStatus::Planned
        );

        // 取消后为终态
        state.production_api.cancel_order(&order.id).unwrap();
        for result in [
            state.production_api.start_order(&order.id),
            state.production_api.delay_order(&order.id),
            state.production_api.cancel_order(&order.id),
        ] {
            assert!(matches!(result, Err(ApiError::InvalidStateTransition { .. })));
        }

        // 失败的转换不发事件
        assert_eq!(recorder.events.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_complete_succeeds_exactly_once() {
        let (_temp_file, state, recorder) = app_with_recorder().await;
        let order = schedule_order(&state, "PO-DONE-1", &[]);

        state.production_api.start_order(&order.id).unwrap();
        let done = state.production_api.complete_order(&order.id).unwrap();
        assert_eq!(done.status, ProductionOrderStatus::Completed);

        let err = state.production_api.complete_order(&order.id).unwrap_err();
        assert!(matches!(err, ApiError::InvalidStateTransition { .. }));
        assert_eq!(
            state.production_api.get_order(&order.id).unwrap().status,
            ProductionOrderStatus::Completed
        );

        let completed = recorder
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type == ProductionEventType::ProductionOrderCompleted)
            .count();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn test_schedule_validation() {
        let (_temp_file, state) = create_test_app().await;
        let start = Utc::now();
        let request = |quantity: i64, end_offset_hours: i64| ScheduleProductionRequest {
            order_number: format!("PO-V-{}-{}", quantity, end_offset_hours),
            part_id: "SHAFT-40".to_string(),
            quantity,
            planned_start: start,
            planned_end: start + Duration::hours(end_offset_hours),
            machine_ids: vec![],
        };

        assert!(matches!(
            state.production_api.schedule_production(request(0, 4)),
            Err(ApiError::InvalidQuantity(0))
        ));
        assert!(matches!(
            state.production_api.schedule_production(request(5, -1)),
            Err(ApiError::InvalidSchedule)
        ));
        // 计划开始 == 计划结束 允许
        assert!(state.production_api.schedule_production(request(5, 0)).is_ok());
        assert!(state.production_api.list_orders().unwrap().len() == 1);
    }

    #[tokio::test]
    async fn test_duplicate_order_number_rejected() {
        let (_temp_file, state) = create_test_app().await;
        schedule_order(&state, "PO-DUP", &[]);

        let start = Utc::now();
        let err = state
            .production_api
            .schedule_production(ScheduleProductionRequest {
                order_number: "PO-DUP".to_string(),
                part_id: "SHAFT-41".to_string(),
                quantity: 1,
                planned_start: start,
                planned_end: start + Duration::hours(1),
                machine_ids: vec![],
            })
            .unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert_eq!(state.production_api.list_orders().unwrap().len(), 1);
    }
}

// ==========================================
// 数控加工执行闭环 - 引擎层事件发布
// ==========================================
// 职责: 定义生产事件发布 trait，实现依赖倒置
// 说明: Engine 层定义 trait，外部集成层（看板/消息总线）实现
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::sync::Arc;

// ==========================================
// 生产事件类型
// ==========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductionEventType {
    ProductionOrderCreated,
    ProductionOrderStarted,
    ProductionOrderCompleted,
    ProductionOrderDelayed,
    ProductionOrderCancelled,
}

impl ProductionEventType {
    /// 转换为字符串标识
    pub fn as_str(&self) -> &str {
        match self {
            ProductionEventType::ProductionOrderCreated => "ProductionOrderCreated",
            ProductionEventType::ProductionOrderStarted => "ProductionOrderStarted",
            ProductionEventType::ProductionOrderCompleted => "ProductionOrderCompleted",
            ProductionEventType::ProductionOrderDelayed => "ProductionOrderDelayed",
            ProductionEventType::ProductionOrderCancelled => "ProductionOrderCancelled",
        }
    }
}

/// 生产事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionEvent {
    pub order_id: String,
    pub order_number: String,
    pub event_type: ProductionEventType,
    pub occurred_at: DateTime<Utc>,
}

impl ProductionEvent {
    pub fn new(order_id: &str, order_number: &str, event_type: ProductionEventType) -> Self {
        Self {
            order_id: order_id.to_string(),
            order_number: order_number.to_string(),
            event_type,
            occurred_at: Utc::now(),
        }
    }
}

// ==========================================
// 事件发布 Trait
// ==========================================

/// 生产事件发布者 Trait
///
/// # 返回
/// - `Ok(message_id)`: 消息 ID（如果支持）或空字符串
/// - `Err`: 发布失败（调用方只记录日志，不回滚业务操作）
pub trait ProductionEventPublisher: Send + Sync {
    fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>>;
}

/// 空操作事件发布者
#[derive(Debug, Clone, Default)]
pub struct NoOpEventPublisher;

impl ProductionEventPublisher for NoOpEventPublisher {
    fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        tracing::debug!(
            "NoOpEventPublisher: 跳过事件发布 - order_id={}, event_type={}",
            event.order_id,
            event.event_type.as_str()
        );
        Ok(String::new())
    }
}

/// 可选的事件发布者包装
///
/// 简化 Option<Arc<dyn ProductionEventPublisher>> 的使用
#[derive(Clone)]
pub struct OptionalEventPublisher {
    inner: Option<Arc<dyn ProductionEventPublisher>>,
}

impl OptionalEventPublisher {
    pub fn with_publisher(publisher: Arc<dyn ProductionEventPublisher>) -> Self {
        Self {
            inner: Some(publisher),
        }
    }

    pub fn none() -> Self {
        Self { inner: None }
    }

    /// 发布事件（如果有发布者）
    pub fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
        match &self.inner {
            Some(publisher) => publisher.publish(event),
            None => {
                tracing::debug!(
                    "OptionalEventPublisher: 未配置发布者，跳过事件 - order_id={}, event_type={}",
                    event.order_id,
                    event.event_type.as_str()
                );
                Ok(String::new())
            }
        }
    }

    pub fn is_configured(&self) -> bool {
        self.inner.is_some()
    }
}

impl Default for OptionalEventPublisher {
    fn default() -> Self {
        Self::none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingPublisher {
        events: Mutex<Vec<ProductionEventType>>,
    }

    impl ProductionEventPublisher for RecordingPublisher {
        fn publish(&self, event: ProductionEvent) -> Result<String, Box<dyn Error + Send + Sync>> {
            self.events.lock().unwrap().push(event.event_type);
            Ok("msg-1".to_string())
        }
    }

    #[test]
    fn test_noop_publisher() {
        let event = ProductionEvent::new(
            "order-PO-1",
            "PO-1",
            ProductionEventType::ProductionOrderCreated,
        );
        assert!(NoOpEventPublisher.publish(event).unwrap().is_empty());
    }

    #[test]
    fn test_optional_publisher_forwards() {
        let recorder = Arc::new(RecordingPublisher {
            events: Mutex::new(Vec::new()),
        });
        let publisher = OptionalEventPublisher::with_publisher(recorder.clone());
        assert!(publisher.is_configured());

        let id = publisher
            .publish(ProductionEvent::new(
                "order-PO-1",
                "PO-1",
                ProductionEventType::ProductionOrderStarted,
            ))
            .unwrap();
        assert_eq!(id, "msg-1");
        assert_eq!(
            *recorder.events.lock().unwrap(),
            vec![ProductionEventType::ProductionOrderStarted]
        );
        assert!(!OptionalEventPublisher::none().is_configured());
    }
}

//! 事件日志条目（Event）
//!
//! 远端事件日志中的一条记录：`id` 由事件源分配，严格递增但允许空洞。
//! 拉取后不可变，仅在一次分发过程中由引擎持有，不做持久化。
//!
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct Event {
    id: u64,
    #[builder(into)]
    event_type: String,
    #[builder(into)]
    attribute_name: Option<String>,
    #[builder(default = empty_meta())]
    #[serde(default = "empty_meta")]
    meta: Value,
    entity: Option<Value>,
    user: Option<Value>,
    project: Option<Value>,
    #[builder(into)]
    session_id: Option<String>,
}

fn empty_meta() -> Value {
    Value::Object(Default::default())
}

impl Event {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute_name.as_deref()
    }

    pub fn meta(&self) -> &Value {
        &self.meta
    }

    pub fn entity(&self) -> Option<&Value> {
        self.entity.as_ref()
    }

    pub fn user(&self) -> Option<&Value> {
        self.user.as_ref()
    }

    pub fn project(&self) -> Option<&Value> {
        self.project.as_ref()
    }

    /// 触发该事件的会话标识，分发时作为关联 ID 传给处理器
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

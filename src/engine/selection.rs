// ==========================================
// 数控加工执行闭环 - 程序选择策略
// ==========================================
// 默认策略: 按登记顺序取第一个兼容该机型的程序
// ==========================================

use crate::domain::nc_program::NcProgram;

/// 程序选择策略
pub trait ProgramSelectionStrategy: Send + Sync {
    /// 从候选程序（按登记顺序）中选出一个
    fn select<'a>(
        &self,
        part_id: &str,
        machine_type: &str,
        candidates: &'a [NcProgram],
    ) -> Option<&'a NcProgram>;

    fn name(&self) -> &str;
}

/// 首个兼容
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCompatibleStrategy;

impl ProgramSelectionStrategy for FirstCompatibleStrategy {
    fn select<'a>(
        &self,
        _part_id: &str,
        machine_type: &str,
        candidates: &'a [NcProgram],
    ) -> Option<&'a NcProgram> {
        candidates.iter().find(|p| p.is_compatible_with(machine_type))
    }

    fn name(&self) -> &str {
        "first_compatible"
    }
}

/// debug label 使用的颜色（RGBA）
pub struct LabelColor;
impl LabelColor {
    const GREEN: [f32; 4] = [0.0, 1.0, 0.0, 1.0];
    const BLUE: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

    /// 普通 pass（compute / transfer）
    pub const COLOR_PASS: [f32; 4] = Self::BLUE;
    /// 带 attachment 的 pass
    pub const COLOR_RENDER_PASS: [f32; 4] = Self::GREEN;
}

use vergen::EmitBuilder;

fn main() {
    // 生成构建信息（--version 中展示构建时间）
    EmitBuilder::builder()
        .build_timestamp()
        .emit()
        .expect("Failed to generate build information");
}

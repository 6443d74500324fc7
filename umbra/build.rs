fn main() {
    shadow_rs::ShadowBuilder::builder()
        .build()
        .expect("shadow-rs build info generation should not fail");
}

/// Hardware execution providers to try for ONNX sessions on this platform.
///
/// `ort` falls through to the CPU provider when none of these load, so an
/// empty list simply means plain CPU inference.
pub fn platform_execution_providers(
) -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        Vec::new()
    }
}

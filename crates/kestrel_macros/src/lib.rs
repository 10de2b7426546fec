use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, ItemFn, LitInt};

/// Automatically profile a function when the `perf_stats` feature is enabled.
///
/// Wraps the function body with a guard that logs the elapsed time on
/// function exit. Compiles to nothing when `perf_stats` is disabled.
///
/// # Features
/// - Logs when duration exceeds the threshold (default 1ms)
/// - Uses `tracing::info!` so output lands in the same sinks as the rest of the crate
/// - Zero-cost abstraction when feature is disabled
///
/// # Example
/// ```ignore
/// #[profile]
/// pub fn patch(&mut self, dirty: &DirtySet) -> AbstractionResult<PatchStats> {
///     // ... work ...
/// }
/// ```
///
/// # Optional Parameters
/// ```ignore
/// #[profile(5)]  // Custom threshold in milliseconds
/// pub fn build(grid: &Grid) -> Self { ... }
/// ```
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);

    let threshold_ms: u128 = if attr.is_empty() {
        1
    } else {
        let lit = parse_macro_input!(attr as LitInt);
        lit.base10_parse().unwrap_or(1)
    };

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let fn_name_str = sig.ident.to_string();

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _profile_timer = {
                struct ProfileGuard {
                    name: &'static str,
                    start: std::time::Instant,
                }
                impl Drop for ProfileGuard {
                    fn drop(&mut self) {
                        let elapsed = self.start.elapsed();
                        if elapsed.as_millis() >= #threshold_ms {
                            tracing::info!("[PERF] {}: {:?}", self.name, elapsed);
                        }
                    }
                }
                ProfileGuard {
                    name: #fn_name_str,
                    start: std::time::Instant::now(),
                }
            };

            #block
        }
    };

    output.into()
}

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that the session is disposed regardless of how the test terminates.
///
/// Injectable dependencies are `crate::session::SessionManager`, `crate::api::Client`
/// and `crate::test_support::FakeBackend`, all wired to the same fake backend.
/// The test runs on a current-thread tokio runtime with a paused clock, so timers
/// fire as soon as the test is otherwise idle.
///
/// Pass `logged_in` to start with a session installed from a successful login.
#[proc_macro_attribute]
pub fn session_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injected arguments and reject invalid function signatures.
    let (test_args, wants_client) = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in before the test starts if requested.
    let maybe_login = parse_macro_input!(args as Option<Ident>)
        .and_then(|arg| {
            if arg == "logged_in" {
                Some(quote! {
                    session
                        .begin(&backend.login_response())
                        .unwrap();
                })
            } else {
                None
            }
        })
        .unwrap_or_default();

    let maybe_client = if wants_client {
        quote! {
            let client = crate::api::Client::from_session(session.clone());
        }
    } else {
        quote! {}
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// Test setup.
            async fn setup() -> (crate::session::SessionManager, crate::test_support::FakeBackend) {
                crate::test_support::init_test_logging();
                let backend = crate::test_support::FakeBackend::new();
                let session = crate::session::SessionManager::new(
                    backend.clone(),
                    crate::session::MemoryStore::default(),
                );

                #maybe_login

                (session, backend)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(session: crate::session::SessionManager) {
                session.dispose();
            }

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .start_paused(true)
                .build()
                .unwrap();

            // Run the setup.
            let (session, backend) = runtime.block_on(setup());
            #maybe_client

            // Run the test, catching any panics.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                runtime.block_on(#new_name(#(#test_args),*));
            }));

            // Run the cleanup.
            runtime.block_on(cleanup(session));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::resume_unwind(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, work out which parameters to inject, and reject
/// unknown parameters.
fn check_sig(sig: Signature) -> Result<(Vec<TokenStream2>, bool), syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut seen = Vec::new();
    let mut args = vec![];
    let mut wants_client = false;

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let Pat::Ident(_) = &*pat_type.pat {
                if let Type::Path(type_path) = &*pat_type.ty {
                    // Valid as the last path segment for any type is itself.
                    let type_ident = type_path.path.segments.last().unwrap().ident.to_string();
                    if seen.contains(&type_ident) {
                        return Err(syn::Error::new(
                            input.span(),
                            format!("Test cannot accept more than one `{type_ident}`"),
                        ));
                    }
                    match type_ident.as_str() {
                        "SessionManager" => args.push(quote! { session.clone() }),
                        "Client" => {
                            wants_client = true;
                            args.push(quote! { client });
                        }
                        "FakeBackend" => args.push(quote! { backend.clone() }),
                        _ => {
                            return Err(syn::Error::new(
                                input.span(),
                                "Expected one of `SessionManager`, `Client` or `FakeBackend`",
                            ))
                        }
                    }
                    seen.push(type_ident);
                    continue;
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `ident: SessionManager`, `ident: Client` or `ident: FakeBackend`",
        ));
    }

    Ok((args, wants_client))
}

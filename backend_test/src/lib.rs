use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, spanned::Spanned, FnArg, Ident, ItemFn, Pat, Signature, Type};

/// Transform an asynchronous test into a synchronous one running against a
/// fresh in-memory store, and inject dependencies.
///
/// Injectable dependencies are [`rocket::local::asynchronous::Client`] and
/// `crate::store::Storage`, the store the client's server runs against.
///
/// `#[backend_test(admin)]` logs the client in as the default admin first.
#[proc_macro_attribute]
pub fn backend_test(args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the parameters to inject and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    // Log in the client as admin if needed.
    let maybe_login = match parse_macro_input!(args as Option<Ident>) {
        None => quote! {},
        Some(arg) if arg == "admin" => quote! {
            // The response borrows the client, so it must go before the test takes it.
            {
                let response = rocket_client
                    .post("/api/login")
                    .header(rocket::http::ContentType::JSON)
                    .body(rocket::serde::json::json!({
                        "regNum": "ADMIN001",
                        "password": "admin123",
                    }).to_string())
                    .dispatch()
                    .await;
                assert_eq!(rocket::http::Status::Ok, response.status(), "admin login failed");
            }
        },
        Some(arg) => {
            return syn::Error::new(arg.span(), "Expected `admin` or nothing")
                .into_compile_error()
                .into();
        }
    };

    // Rewrite the test function.
    quote! {
        #[test]
        fn #name() {
            /// The test itself.
            #item_fn

            log4rs_test_utils::test_logging::init_logging_once_for(["ovs_backend"], None, None);

            let runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("rocket-worker-test-thread")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                // Test setup.
                let storage = crate::store::Storage::new(crate::store::MemoryStore::new());
                let rocket_client = rocket::local::asynchronous::Client::tracked(
                    crate::test_rocket(storage.clone()),
                )
                .await
                .unwrap();

                #maybe_login

                #new_name(#(#test_args),*).await;
            });
        }
    }
    .into()
}

/// Ensure the wrapped test is async, extract parameters to inject, and reject unknown parameters.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_client = false;
    let mut has_storage = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(type_ident) = type_path.path.get_ident() {
                    if type_ident == "Client" {
                        if has_client {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `rocket::local::asynchronous::Client`",
                            ));
                        }
                        has_client = true;
                        args.push(quote! { rocket_client });
                        continue;
                    } else if type_ident == "Storage" {
                        if has_storage {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `Storage`",
                            ));
                        }
                        has_storage = true;
                        args.push(quote! { storage.clone() });
                        continue;
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `client_ident: Client` or `storage_ident: Storage`",
        ));
    }

    Ok(args)
}

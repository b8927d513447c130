use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::quote;
use syn::{Ident, ItemFn};

/// Proc macro to denote a Transaction
///
/// A transaction is a single timed request. Its latency is recorded under the function name, and
/// an `Err` return counts as a failed request and an iteration error.
///
/// NOTE: Currently this macro only works on functions with a `Result<T, E>` return value.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// #[transaction]
/// async fn get_all_users(client: &Client) -> Result<Reply, reqwest::Error> {
///     ...
/// }
/// ```
#[proc_macro_attribute]
pub fn transaction(attr: TokenStream, item: TokenStream) -> TokenStream {
    transaction_internal(attr, item).into()
}

fn transaction_internal(_attr: TokenStream, item: TokenStream) -> TokenStream2 {
    let input = match syn::parse::<ItemFn>(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let stmts = &block.stmts;
    let name = &sig.ident;

    quote! {
        #(#attrs)* #vis #sig {
            ::stampede::transaction::transaction_hook(
                ::stampede::core::generate_labels!(#name),
                async move {
                    #(#stmts)*
                },
            ).await
        }
    }
}

/// Proc macro to denote a Scenario
///
/// A scenario is one virtual-user iteration. The function is called repeatedly by every active
/// virtual user for as long as the ramp profile runs.
///
/// NOTE: Currently this macro only works on async functions which take no arguments and return
/// either `()` or `Result<(), E>`.
///
/// See the `Scenario` struct for more information on the methods this macro provides on functions.
///
/// # Example
/// ```ignore
/// use stampede::prelude::*;
///
/// #[scenario]
/// async fn my_scenario() {
/// }
/// ```
#[proc_macro_attribute]
pub fn scenario(attr: TokenStream, item: TokenStream) -> TokenStream {
    scenario_internal(attr, item).into()
}

fn scenario_internal(_attr: TokenStream, item: TokenStream) -> TokenStream2 {
    let input = match syn::parse::<ItemFn>(item) {
        Ok(input) => input,
        Err(err) => return err.to_compile_error(),
    };

    let ItemFn {
        attrs,
        vis,
        sig,
        block,
    } = input;
    let stmts = &block.stmts;

    if sig.asyncness.is_none() {
        return syn::Error::new_spanned(&sig.fn_token, "#[scenario] requires an async fn")
            .to_compile_error();
    }

    if !sig.inputs.is_empty() {
        return syn::Error::new_spanned(&sig.inputs, "#[scenario] functions take no arguments")
            .to_compile_error();
    }

    let new_name = Ident::new(&format!("__stampede_{}", sig.ident), Span::call_site());
    let mut new_sig = sig.clone();
    new_sig.ident = new_name.clone();

    let mut scen_sig = sig.clone();
    let scen_name = sig.ident.clone();
    scen_sig.asyncness = None;
    scen_sig.output = syn::parse_quote! {
        -> impl ::stampede::scenario::ConfigurableScenario<::stampede::core::RunStatistics>
    };

    quote! {
        #(#attrs)* #vis #scen_sig {
            ::stampede::scenario::Scenario::new(stringify!(#scen_name), #new_name)
        }

        #[doc(hidden)]
        #(#attrs)* #vis #new_sig {
            #(#stmts)*
        }
    }
}

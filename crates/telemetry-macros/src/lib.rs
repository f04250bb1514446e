// Copyright The OpenTelemetry Authors
// SPDX-License-Identifier: Apache-2.0

//! Proc-macros generating `AttributeSetHandler` and `MetricSetHandler` impls.
//!
//! `#[attribute_set(name = "...")]` is applied to a struct whose fields are
//! marked `#[attribute]` (a leaf attribute, optionally `#[attribute(key = "...")]`
//! to override the emitted key) or `#[compose]` (a nested attribute set whose
//! own values are flattened in).
//!
//! `#[metric_set(name = "...")]` is applied to a struct whose fields are
//! `Counter<T>` / `Gauge<T>` instruments, each annotated with
//! `#[metric(name = "...", unit = "...")]`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{Data, DeriveInput, Fields, Lit, Meta, parse_macro_input};

/// Extracts a `key = "value"` string literal from a parenthesized attribute argument list.
fn extract_str_arg(args: &syn::punctuated::Punctuated<Meta, syn::Token![,]>, key: &str) -> Option<String> {
    for meta in args {
        if let Meta::NameValue(nv) = meta {
            if nv.path.is_ident(key) {
                if let syn::Expr::Lit(syn::ExprLit {
                    lit: Lit::Str(s), ..
                }) = &nv.value
                {
                    return Some(s.value());
                }
            }
        }
    }
    None
}

fn guess_attribute_type(ty: &syn::Type) -> TokenStream2 {
    let s = quote!(#ty).to_string();
    if s.contains("bool") {
        quote! { otap_df_telemetry::descriptor::AttributeValueType::Boolean }
    } else if s.contains("f32") || s.contains("f64") {
        quote! { otap_df_telemetry::descriptor::AttributeValueType::Double }
    } else if s.contains("i64")
        || s.contains("i32")
        || s.contains("u64")
        || s.contains("u32")
        || s.contains("usize")
    {
        quote! { otap_df_telemetry::descriptor::AttributeValueType::Int }
    } else {
        quote! { otap_df_telemetry::descriptor::AttributeValueType::String }
    }
}

fn guess_instrument(ty: &syn::Type) -> TokenStream2 {
    let s = quote!(#ty).to_string();
    if s.contains("Gauge") {
        quote! { otap_df_telemetry::descriptor::Instrument::Gauge }
    } else {
        quote! { otap_df_telemetry::descriptor::Instrument::Counter }
    }
}

/// See module docs.
#[proc_macro_attribute]
pub fn attribute_set(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args =
        syn::parse::Parser::parse(
            syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated,
            attr,
        )
        .unwrap_or_default();
    let set_name = extract_str_arg(&attr_args, "name").unwrap_or_default();

    let input = parse_macro_input!(item as DeriveInput);
    let ident = &input.ident;
    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return syn::Error::new_spanned(ident, "attribute_set requires named fields")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(ident, "attribute_set requires a struct")
                .to_compile_error()
                .into();
        }
    };

    let mut descriptor_fields = Vec::new();
    let mut value_pushes = Vec::new();

    for field in fields {
        let field_ident = field.ident.as_ref().expect("named field");
        let mut is_compose = false;
        let mut is_attribute = false;
        let mut key_override = None;

        for attr in &field.attrs {
            if attr.path().is_ident("compose") {
                is_compose = true;
            } else if attr.path().is_ident("attribute") {
                is_attribute = true;
                if let Meta::List(list) = &attr.meta {
                    if let Ok(args) = syn::parse::Parser::parse2(
                        syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated,
                        list.tokens.clone(),
                    ) {
                        key_override = extract_str_arg(&args, "key");
                    }
                }
            }
        }

        if is_compose {
            value_pushes.push(quote! {
                values.extend(otap_df_telemetry::attributes::AttributeSetHandler::attribute_values(&self.#field_ident));
            });
        } else if is_attribute {
            let key = key_override.unwrap_or_else(|| field_ident.to_string());
            let ty = &field.ty;
            let attr_type = guess_attribute_type(ty);
            descriptor_fields.push(quote! {
                otap_df_telemetry::descriptor::AttributeField {
                    key: #key,
                    brief: "",
                    r#type: #attr_type,
                }
            });
            value_pushes.push(quote! {
                values.push(otap_df_telemetry::attributes::AttributeValue::from(self.#field_ident.clone()));
            });
        }
    }

    let descriptor_ident = syn::Ident::new(
        &format!("__{}_ATTRS_DESCRIPTOR", ident.to_string().to_uppercase()),
        ident.span(),
    );

    let expanded = quote! {
        #input

        static #descriptor_ident: otap_df_telemetry::descriptor::AttributesDescriptor =
            otap_df_telemetry::descriptor::AttributesDescriptor {
                name: #set_name,
                fields: &[ #(#descriptor_fields),* ],
            };

        impl otap_df_telemetry::attributes::AttributeSetHandler for #ident {
            fn descriptor(&self) -> &'static otap_df_telemetry::descriptor::AttributesDescriptor {
                &#descriptor_ident
            }

            fn attribute_values(&self) -> Vec<otap_df_telemetry::attributes::AttributeValue> {
                let mut values = Vec::new();
                #(#value_pushes)*
                values
            }
        }
    };

    expanded.into()
}

/// See module docs.
#[proc_macro_attribute]
pub fn metric_set(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attr_args =
        syn::parse::Parser::parse(
            syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated,
            attr,
        )
        .unwrap_or_default();
    let set_name = extract_str_arg(&attr_args, "name").unwrap_or_default();

    let input = parse_macro_input!(item as DeriveInput);
    let ident = &input.ident;
    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(named) => &named.named,
            _ => {
                return syn::Error::new_spanned(ident, "metric_set requires named fields")
                    .to_compile_error()
                    .into();
            }
        },
        _ => {
            return syn::Error::new_spanned(ident, "metric_set requires a struct")
                .to_compile_error()
                .into();
        }
    };

    let mut descriptor_fields = Vec::new();
    let mut snapshot_pushes = Vec::new();

    for field in fields {
        let field_ident = field.ident.as_ref().expect("named field");
        let Some(metric_attr) = field.attrs.iter().find(|a| a.path().is_ident("metric")) else {
            continue;
        };
        let mut metric_name = field_ident.to_string();
        let mut unit = String::new();
        if let Meta::List(list) = &metric_attr.meta {
            if let Ok(args) = syn::parse::Parser::parse2(
                syn::punctuated::Punctuated::<Meta, syn::Token![,]>::parse_terminated,
                list.tokens.clone(),
            ) {
                if let Some(n) = extract_str_arg(&args, "name") {
                    metric_name = n;
                }
                if let Some(u) = extract_str_arg(&args, "unit") {
                    unit = u;
                }
            }
        }

        let ty = &field.ty;
        let instrument = guess_instrument(ty);
        descriptor_fields.push(quote! {
            otap_df_telemetry::descriptor::MetricsField {
                key: #metric_name,
                brief: "",
                unit: #unit,
                instrument: #instrument,
            }
        });
        snapshot_pushes.push(quote! {
            values.push((#metric_name, self.#field_ident.get() as i64));
        });
    }

    let descriptor_ident = syn::Ident::new(
        &format!("__{}_METRICS_DESCRIPTOR", ident.to_string().to_uppercase()),
        ident.span(),
    );

    let expanded = quote! {
        #input

        static #descriptor_ident: otap_df_telemetry::descriptor::MetricsDescriptor =
            otap_df_telemetry::descriptor::MetricsDescriptor {
                name: #set_name,
                fields: &[ #(#descriptor_fields),* ],
            };

        impl otap_df_telemetry::metrics::MetricSetHandler for #ident {
            fn descriptor(&self) -> &'static otap_df_telemetry::descriptor::MetricsDescriptor {
                &#descriptor_ident
            }

            fn snapshot(&self) -> Vec<(&'static str, i64)> {
                let mut values = Vec::new();
                #(#snapshot_pushes)*
                values
            }
        }
    };

    expanded.into()
}

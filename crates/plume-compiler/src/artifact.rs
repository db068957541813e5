//! Artifact assembly: preamble, body, epilogue.
//!
//! The output is one self-contained host script. It takes a single `$data`
//! argument, accumulates output lines into a list joined once at the end,
//! and wraps the generated body in a try/catch that tags any runtime
//! failure with the last emitted source coordinate.

use crate::options::CompileOptions;

/// Runtime helper functions included verbatim in every artifact.
///
/// `out_attr` renders one attribute, dispatching `class` values through
/// `out_class` (flatten, merge truthy dictionary keys, dedupe in insertion
/// order) and `style` values through `out_style` (kebab-case dictionary
/// keys). `out_merged_attrs` implements `&attributes(expr)` merging.
const HELPERS: &str = r#"function out_enc {
    param($value)
    $text = [string]$value
    $text.Replace('&', '&amp;').Replace('<', '&lt;').Replace('>', '&gt;').Replace('"', '&quot;')
}

function out_class_add {
    param($value, $seen)
    if ($null -eq $value -or ($value -is [bool] -and -not $value)) { return }
    if ($value -is [System.Collections.IDictionary]) {
        foreach ($entry in $value.GetEnumerator()) {
            if ($entry.Value) { out_class_add ([string]$entry.Key) $seen }
        }
        return
    }
    if ($value -isnot [string] -and $value -is [System.Collections.IEnumerable]) {
        foreach ($item in $value) { out_class_add $item $seen }
        return
    }
    foreach ($part in (([string]$value) -split ' ')) {
        if ($part -and -not $seen.Contains($part)) { [void]$seen.Add($part) }
    }
}

function out_class {
    param($value)
    $seen = [System.Collections.Generic.List[string]]::new()
    out_class_add $value $seen
    $seen -join ' '
}

function out_style {
    param($value)
    if ($value -is [System.Collections.IDictionary]) {
        $parts = foreach ($entry in $value.GetEnumerator()) {
            $key = [regex]::Replace([string]$entry.Key, '(?<=.)([A-Z])', '-$1').ToLowerInvariant()
            '{0}: {1}' -f $key, [string]$entry.Value
        }
        return ($parts -join '; ')
    }
    [string]$value
}

function out_attr {
    param($key, $value, $escape)
    if ($null -eq $value -or ($value -is [bool] -and -not $value)) { return '' }
    if ($value -is [bool]) {
        if ($script:pug_properties) { return " $key" }
        return " $key=`"$key`""
    }
    $text = switch ($key) {
        'class' { out_class $value }
        'style' { out_style $value }
        default { [string]$value }
    }
    if ($escape) { $text = out_enc $text }
    " $key=`"$text`""
}

function out_merged_attrs {
    param($attrs, $extra)
    $merged = [ordered]@{}
    foreach ($entry in $attrs.GetEnumerator()) { $merged[[string]$entry.Key] = $entry.Value }
    if ($extra -is [System.Collections.IDictionary]) {
        foreach ($entry in $extra.GetEnumerator()) {
            $key = [string]$entry.Key
            if ($key -eq 'class' -and $merged.Contains($key)) {
                $merged[$key] = @($merged[$key], $entry.Value)
            } elseif ($key -eq 'style' -and $merged.Contains($key)) {
                $merged[$key] = '{0}; {1}' -f (out_style $merged[$key]), (out_style $entry.Value)
            } else {
                $merged[$key] = $entry.Value
            }
        }
    }
    $out = ''
    foreach ($entry in $merged.GetEnumerator()) { $out += out_attr $entry.Key $entry.Value $true }
    $out
}
"#;

/// Concatenate preamble, generated body and epilogue into the final script.
#[must_use]
pub fn assemble(options: &CompileOptions, body: &[String]) -> String {
    let mut out = String::with_capacity(HELPERS.len() + 512 + body.iter().map(String::len).sum::<usize>());
    out.push_str("param($data)\n\n");
    out.push_str("$script:src_line = 0\n");
    out.push_str("$script:src_path = ''\n");
    out.push_str(&format!(
        "$script:pug_properties = ${}\n\n",
        options.properties
    ));
    out.push_str(HELPERS);
    out.push_str("\n$lines = [System.Collections.Generic.List[string]]::new()\n");
    out.push_str("try {\n");
    for line in body {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("}\n");
    out.push_str("catch {\n");
    out.push_str("    $_.Exception.Data['PugLine'] = $script:src_line\n");
    out.push_str("    $_.Exception.Data['PugPath'] = $script:src_path\n");
    out.push_str("    throw\n");
    out.push_str("}\n");
    out.push_str("$lines -join \"`n\"\n");
    out
}

//! The fixed C runtime the generated translation unit links against,
//! shipped as string constants so the driver can drop `pb_runtime.h` /
//! `pb_runtime.c` next to the generated file, plus small helpers for
//! invoking the system C compiler.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};

pub const PB_RUNTIME_H: &str = r#"#ifndef PB_RUNTIME_H
#define PB_RUNTIME_H

#include <setjmp.h>
#include <stdbool.h>
#include <stdint.h>
#include <stdio.h>
#include <stdlib.h>
#include <string.h>

/* ------------ PRINT ------------- */

void pb_print_int(int64_t x);
void pb_print_double(double x);
void pb_print_str(const char *s);
void pb_print_bool(bool b);

/* Return thread-unsafe static buffers (cycled 4-wide), suitable for
 * composing a single snprintf. */
const char *pb_format_int(int64_t x);
const char *pb_format_double(double x);

/* ------------ ERROR HANDLING ------------- */

void pb_fail(const char *msg);

/* ------------ EXCEPTIONS ------------- */

typedef struct PbTryContext {
    jmp_buf env;
    struct PbTryContext *prev;
} PbTryContext;

typedef struct {
    const char *type;
    void *value;
} PbException;

extern PbTryContext *pb_current_try;
extern PbException pb_current_exc;

#define PB_MAX_TRY_DEPTH 256

void pb_push_try(PbTryContext *ctx);
void pb_pop_try(void);
void pb_raise_msg(const char *type, const char *msg);
/* obj must carry a leading `const char *` message attribute in its own
 * layout; generated handlers read it through the class type. */
void pb_raise_obj(const char *type, void *obj);
void pb_clear_exc(void);
void pb_reraise(void);

/* ------------ CHECKED ARITHMETIC ------------- */

double pb_div(double a, double b);
int64_t pb_floordiv_int(int64_t a, int64_t b);
double pb_floordiv_double(double a, double b);
int64_t pb_mod_int(int64_t a, int64_t b);
double pb_mod_double(double a, double b);

/* ------------ LIST ------------- */

#define PB_INITIAL_LIST_CAPACITY 4

typedef struct {
    int64_t len;
    int64_t capacity;
    int64_t *data;
} List_int;

typedef struct {
    int64_t len;
    int64_t capacity;
    double *data;
} List_float;

typedef struct {
    int64_t len;
    int64_t capacity;
    bool *data;
} List_bool;

typedef struct {
    int64_t len;
    int64_t capacity;
    const char **data;
} List_str;

void list_int_init(List_int *lst);
int64_t list_int_get(List_int *lst, int64_t index);
void list_int_set(List_int *lst, int64_t index, int64_t value);
void list_int_append(List_int *lst, int64_t value);
int64_t list_int_pop(List_int *lst);
bool list_int_remove(List_int *lst, int64_t value);
void list_int_free(List_int *lst);
void list_int_print(const List_int *lst);

void list_float_init(List_float *lst);
double list_float_get(List_float *lst, int64_t index);
void list_float_set(List_float *lst, int64_t index, double value);
void list_float_append(List_float *lst, double value);
double list_float_pop(List_float *lst);
bool list_float_remove(List_float *lst, double value);
void list_float_free(List_float *lst);
void list_float_print(const List_float *lst);

void list_bool_init(List_bool *lst);
bool list_bool_get(List_bool *lst, int64_t index);
void list_bool_set(List_bool *lst, int64_t index, bool value);
void list_bool_append(List_bool *lst, bool value);
bool list_bool_pop(List_bool *lst);
bool list_bool_remove(List_bool *lst, bool value);
void list_bool_free(List_bool *lst);
void list_bool_print(const List_bool *lst);

void list_str_init(List_str *lst);
const char *list_str_get(List_str *lst, int64_t index);
void list_str_set(List_str *lst, int64_t index, const char *value);
void list_str_append(List_str *lst, const char *value);
const char *list_str_pop(List_str *lst);
bool list_str_remove(List_str *lst, const char *value);
void list_str_free(List_str *lst);
void list_str_print(const List_str *lst);

/* ------------ DICT ------------- */

typedef struct {
    const char *key;
    int64_t value;
} Pair_str_int;

typedef struct {
    int64_t len;
    Pair_str_int *data;
} Dict_str_int;

typedef struct {
    const char *key;
    double value;
} Pair_str_float;

typedef struct {
    int64_t len;
    Pair_str_float *data;
} Dict_str_float;

typedef struct {
    const char *key;
    bool value;
} Pair_str_bool;

typedef struct {
    int64_t len;
    Pair_str_bool *data;
} Dict_str_bool;

typedef struct {
    const char *key;
    const char *value;
} Pair_str_str;

typedef struct {
    int64_t len;
    Pair_str_str *data;
} Dict_str_str;

int64_t pb_dict_get_str_int(Dict_str_int d, const char *key);
double pb_dict_get_str_float(Dict_str_float d, const char *key);
bool pb_dict_get_str_bool(Dict_str_bool d, const char *key);
const char *pb_dict_get_str_str(Dict_str_str d, const char *key);

void dict_str_int_print(const Dict_str_int *d);
void dict_str_float_print(const Dict_str_float *d);
void dict_str_bool_print(const Dict_str_bool *d);
void dict_str_str_print(const Dict_str_str *d);

#endif /* PB_RUNTIME_H */
"#;

pub const PB_RUNTIME_C: &str = r#"#include "pb_runtime.h"

/* ------------ PRINT ------------- */

void pb_print_int(int64_t x) { printf("%lld\n", (long long)x); }

void pb_print_double(double x)
{
    if (x == (double)(int64_t)x) {
        printf("%.1f\n", x);   /* 50.0 keeps its .0 */
    } else {
        printf("%.15g\n", x);  /* Python-like float precision */
    }
}

void pb_print_str(const char *s) { printf("%s\n", s); }
void pb_print_bool(bool b) { printf("%s\n", b ? "True" : "False"); }

const char *pb_format_int(int64_t x)
{
    static char bufs[4][32];
    static int i = 0;
    i = (i + 1) % 4;
    snprintf(bufs[i], sizeof(bufs[i]), "%lld", (long long)x);
    return bufs[i];
}

const char *pb_format_double(double x)
{
    static char bufs[4][32];
    static int i = 0;
    i = (i + 1) % 4;
    if (x == (double)(int64_t)x) {
        snprintf(bufs[i], sizeof(bufs[i]), "%.1f", x);
    } else {
        snprintf(bufs[i], sizeof(bufs[i]), "%.15g", x);
    }
    return bufs[i];
}

/* ------------ ERROR HANDLING ------------- */

void pb_fail(const char *msg)
{
    fprintf(stderr, "%s\n", msg);
    exit(EXIT_FAILURE);
}

/* ------------ EXCEPTIONS ------------- */

PbTryContext *pb_current_try = NULL;
PbException pb_current_exc = {NULL, NULL};

static int pb_try_depth = 0;

void pb_push_try(PbTryContext *ctx)
{
    if (++pb_try_depth > PB_MAX_TRY_DEPTH) {
        pb_fail("Maximum try depth exceeded");
    }
    ctx->prev = pb_current_try;
    pb_current_try = ctx;
}

void pb_pop_try(void)
{
    if (!pb_current_try) {
        pb_fail("Try stack underflow");
    }
    pb_current_try = pb_current_try->prev;
    pb_try_depth--;
}

static void pb_unwind(void)
{
    if (pb_current_try) {
        PbTryContext *ctx = pb_current_try;
        pb_pop_try();
        longjmp(ctx->env, 1);
    }
    char buf[320];
    if (pb_current_exc.value) {
        snprintf(buf, sizeof(buf), "Uncaught %s: %s", pb_current_exc.type,
                 (const char *)pb_current_exc.value);
    } else {
        snprintf(buf, sizeof(buf), "Uncaught %s", pb_current_exc.type);
    }
    pb_fail(buf);
}

void pb_raise_msg(const char *type, const char *msg)
{
    pb_current_exc.type = type;
    pb_current_exc.value = (void *)msg;
    pb_unwind();
}

void pb_raise_obj(const char *type, void *obj)
{
    pb_current_exc.type = type;
    pb_current_exc.value = obj;
    pb_unwind();
}

void pb_clear_exc(void)
{
    pb_current_exc.type = NULL;
    pb_current_exc.value = NULL;
}

void pb_reraise(void)
{
    if (!pb_current_exc.type) {
        pb_fail("Cannot re-raise: no active exception");
    }
    pb_unwind();
}

/* ------------ CHECKED ARITHMETIC ------------- */

double pb_div(double a, double b)
{
    if (b == 0.0) {
        pb_raise_msg("ZeroDivisionError", "division by zero");
    }
    return a / b;
}

int64_t pb_floordiv_int(int64_t a, int64_t b)
{
    if (b == 0) {
        pb_raise_msg("ZeroDivisionError", "integer division or modulo by zero");
    }
    int64_t q = a / b;
    int64_t r = a % b;
    if (r != 0 && ((r < 0) != (b < 0))) {
        q--;
    }
    return q;
}

double pb_floordiv_double(double a, double b)
{
    if (b == 0.0) {
        pb_raise_msg("ZeroDivisionError", "float floor division by zero");
    }
    double q = a / b;
    int64_t t = (int64_t)q;
    if (q < (double)t) {
        t--;
    }
    return (double)t;
}

int64_t pb_mod_int(int64_t a, int64_t b)
{
    if (b == 0) {
        pb_raise_msg("ZeroDivisionError", "integer division or modulo by zero");
    }
    int64_t r = a % b;
    if (r != 0 && ((r < 0) != (b < 0))) {
        r += b;
    }
    return r;
}

double pb_mod_double(double a, double b)
{
    if (b == 0.0) {
        pb_raise_msg("ZeroDivisionError", "float modulo by zero");
    }
    return a - pb_floordiv_double(a, b) * b;
}

/* ------------ LIST ------------- */

/* Literals borrow stack or static storage and carry capacity 0; the
 * first growth copies them onto the heap. */
#define PB_DEFINE_LIST(SUFFIX, TYPE, TYPENAME)                                  \
    static void list_##SUFFIX##_grow_if_needed(List_##SUFFIX *lst)              \
    {                                                                           \
        if (lst->capacity == 0) {                                               \
            int64_t cap = PB_INITIAL_LIST_CAPACITY;                             \
            while (cap <= lst->len) {                                           \
                cap *= 2;                                                       \
            }                                                                   \
            TYPE *fresh = (TYPE *)malloc((size_t)cap * sizeof(TYPE));           \
            if (!fresh) {                                                       \
                pb_fail("No memory to resize " TYPENAME);                       \
            }                                                                   \
            if (lst->data && lst->len > 0) {                                    \
                memcpy(fresh, lst->data, (size_t)lst->len * sizeof(TYPE));      \
            }                                                                   \
            lst->data = fresh;                                                  \
            lst->capacity = cap;                                                \
            return;                                                             \
        }                                                                       \
        if (lst->len >= lst->capacity) {                                        \
            int64_t cap = lst->capacity * 2;                                    \
            TYPE *fresh = (TYPE *)realloc(lst->data, (size_t)cap * sizeof(TYPE)); \
            if (!fresh) {                                                       \
                pb_fail("No memory to resize " TYPENAME);                       \
            }                                                                   \
            lst->data = fresh;                                                  \
            lst->capacity = cap;                                                \
        }                                                                       \
    }                                                                           \
                                                                                \
    void list_##SUFFIX##_init(List_##SUFFIX *lst)                               \
    {                                                                           \
        lst->len = 0;                                                           \
        lst->capacity = 0;                                                      \
        lst->data = NULL;                                                       \
    }                                                                           \
                                                                                \
    TYPE list_##SUFFIX##_get(List_##SUFFIX *lst, int64_t index)                 \
    {                                                                           \
        if (index < 0 || index >= lst->len) {                                   \
            static char buf[96];                                                \
            snprintf(buf, sizeof(buf),                                          \
                     "index %lld out of range for " TYPENAME " of length %lld", \
                     (long long)index, (long long)lst->len);                    \
            pb_raise_msg("IndexError", buf);                                    \
        }                                                                       \
        return lst->data[index];                                                \
    }                                                                           \
                                                                                \
    void list_##SUFFIX##_set(List_##SUFFIX *lst, int64_t index, TYPE value)     \
    {                                                                           \
        if (index == lst->len) { /* assignment one past the end appends */      \
            list_##SUFFIX##_append(lst, value);                                 \
            return;                                                             \
        }                                                                       \
        if (index < 0 || index > lst->len) {                                    \
            static char buf[96];                                                \
            snprintf(buf, sizeof(buf),                                          \
                     "cannot assign to index %lld in " TYPENAME                 \
                     " of length %lld",                                         \
                     (long long)index, (long long)lst->len);                    \
            pb_raise_msg("IndexError", buf);                                    \
        }                                                                       \
        lst->data[index] = value;                                               \
    }                                                                           \
                                                                                \
    void list_##SUFFIX##_append(List_##SUFFIX *lst, TYPE value)                 \
    {                                                                           \
        list_##SUFFIX##_grow_if_needed(lst);                                    \
        lst->data[lst->len++] = value;                                          \
    }                                                                           \
                                                                                \
    TYPE list_##SUFFIX##_pop(List_##SUFFIX *lst)                                \
    {                                                                           \
        if (lst->len == 0) {                                                    \
            pb_raise_msg("IndexError", "pop from empty " TYPENAME);             \
        }                                                                       \
        return lst->data[--lst->len];                                           \
    }                                                                           \
                                                                                \
    void list_##SUFFIX##_free(List_##SUFFIX *lst)                               \
    {                                                                           \
        if (lst->capacity > 0 && lst->data) {                                   \
            free(lst->data);                                                    \
        }                                                                       \
        lst->data = NULL;                                                       \
        lst->len = 0;                                                           \
        lst->capacity = 0;                                                      \
    }

PB_DEFINE_LIST(int, int64_t, "list[int]")
PB_DEFINE_LIST(float, double, "list[float]")
PB_DEFINE_LIST(bool, bool, "list[bool]")
PB_DEFINE_LIST(str, const char *, "list[str]")

bool list_int_remove(List_int *lst, int64_t value)
{
    for (int64_t i = 0; i < lst->len; ++i) {
        if (lst->data[i] == value) {
            for (int64_t j = i; j + 1 < lst->len; ++j) {
                lst->data[j] = lst->data[j + 1];
            }
            lst->len--;
            return true;
        }
    }
    return false;
}

bool list_float_remove(List_float *lst, double value)
{
    for (int64_t i = 0; i < lst->len; ++i) {
        if (lst->data[i] == value) {
            for (int64_t j = i; j + 1 < lst->len; ++j) {
                lst->data[j] = lst->data[j + 1];
            }
            lst->len--;
            return true;
        }
    }
    return false;
}

bool list_bool_remove(List_bool *lst, bool value)
{
    for (int64_t i = 0; i < lst->len; ++i) {
        if (lst->data[i] == value) {
            for (int64_t j = i; j + 1 < lst->len; ++j) {
                lst->data[j] = lst->data[j + 1];
            }
            lst->len--;
            return true;
        }
    }
    return false;
}

bool list_str_remove(List_str *lst, const char *value)
{
    for (int64_t i = 0; i < lst->len; ++i) {
        if (strcmp(lst->data[i], value) == 0) {
            for (int64_t j = i; j + 1 < lst->len; ++j) {
                lst->data[j] = lst->data[j + 1];
            }
            lst->len--;
            return true;
        }
    }
    return false;
}

void list_int_print(const List_int *lst)
{
    printf("[");
    for (int64_t i = 0; i < lst->len; ++i) {
        if (i > 0) printf(", ");
        printf("%lld", (long long)lst->data[i]);
    }
    printf("]\n");
}

void list_float_print(const List_float *lst)
{
    printf("[");
    for (int64_t i = 0; i < lst->len; ++i) {
        if (i > 0) printf(", ");
        printf("%s", pb_format_double(lst->data[i]));
    }
    printf("]\n");
}

void list_bool_print(const List_bool *lst)
{
    printf("[");
    for (int64_t i = 0; i < lst->len; ++i) {
        if (i > 0) printf(", ");
        printf("%s", lst->data[i] ? "True" : "False");
    }
    printf("]\n");
}

/* String elements print like Python's repr: single quotes unless the
 * string itself contains one. */
static void pb_print_quoted(const char *s)
{
    if (strchr(s, '\'') != NULL) {
        printf("\"%s\"", s);
    } else {
        printf("'%s'", s);
    }
}

void list_str_print(const List_str *lst)
{
    printf("[");
    for (int64_t i = 0; i < lst->len; ++i) {
        if (i > 0) printf(", ");
        pb_print_quoted(lst->data[i]);
    }
    printf("]\n");
}

/* ------------ DICT ------------- */

int64_t pb_dict_get_str_int(Dict_str_int d, const char *key)
{
    for (int64_t i = 0; i < d.len; ++i) {
        if (strcmp(d.data[i].key, key) == 0) return d.data[i].value;
    }
    pb_fail("Key not found in dict");
    return 0;
}

double pb_dict_get_str_float(Dict_str_float d, const char *key)
{
    for (int64_t i = 0; i < d.len; ++i) {
        if (strcmp(d.data[i].key, key) == 0) return d.data[i].value;
    }
    pb_fail("Key not found in dict");
    return 0.0;
}

bool pb_dict_get_str_bool(Dict_str_bool d, const char *key)
{
    for (int64_t i = 0; i < d.len; ++i) {
        if (strcmp(d.data[i].key, key) == 0) return d.data[i].value;
    }
    pb_fail("Key not found in dict");
    return false;
}

const char *pb_dict_get_str_str(Dict_str_str d, const char *key)
{
    for (int64_t i = 0; i < d.len; ++i) {
        if (strcmp(d.data[i].key, key) == 0) return d.data[i].value;
    }
    pb_fail("Key not found in dict");
    return "";
}

void dict_str_int_print(const Dict_str_int *d)
{
    printf("{");
    for (int64_t i = 0; i < d->len; ++i) {
        if (i > 0) printf(", ");
        pb_print_quoted(d->data[i].key);
        printf(": %lld", (long long)d->data[i].value);
    }
    printf("}\n");
}

void dict_str_float_print(const Dict_str_float *d)
{
    printf("{");
    for (int64_t i = 0; i < d->len; ++i) {
        if (i > 0) printf(", ");
        pb_print_quoted(d->data[i].key);
        printf(": %s", pb_format_double(d->data[i].value));
    }
    printf("}\n");
}

void dict_str_bool_print(const Dict_str_bool *d)
{
    printf("{");
    for (int64_t i = 0; i < d->len; ++i) {
        if (i > 0) printf(", ");
        pb_print_quoted(d->data[i].key);
        printf(": %s", d->data[i].value ? "True" : "False");
    }
    printf("}\n");
}

void dict_str_str_print(const Dict_str_str *d)
{
    printf("{");
    for (int64_t i = 0; i < d->len; ++i) {
        if (i > 0) printf(", ");
        pb_print_quoted(d->data[i].key);
        printf(": ");
        pb_print_quoted(d->data[i].value);
    }
    printf("}\n");
}
"#;

/// Escape a decoded PB string for inclusion in a C string literal.
pub fn escape_c_string(value: &str) -> String {
    let mut escaped = String::new();
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            '\0' => escaped.push_str("\\0"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Write `pb_runtime.h` and `pb_runtime.c` into `dir`.
pub fn write_runtime(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Creating {}", dir.display()))?;
    fs::write(dir.join("pb_runtime.h"), PB_RUNTIME_H).context("Writing pb_runtime.h")?;
    fs::write(dir.join("pb_runtime.c"), PB_RUNTIME_C).context("Writing pb_runtime.c")?;
    Ok(())
}

/// Compile a generated translation unit together with the runtime using
/// the system `cc`. Returns the binary path.
pub fn compile_c(c_path: &Path, binary_path: &Path) -> Result<PathBuf> {
    let dir = c_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    write_runtime(&dir)?;

    let compile = Command::new("cc")
        .arg("-std=c99")
        .arg("-O2")
        .arg(c_path)
        .arg(dir.join("pb_runtime.c"))
        .arg("-o")
        .arg(binary_path)
        .output()
        .context("Running C compiler")?;
    if !compile.status.success() {
        let stderr = String::from_utf8_lossy(&compile.stderr);
        bail!("C compilation failed: {stderr}");
    }
    Ok(binary_path.to_path_buf())
}

/// Run a compiled program, capturing stdout. A non-zero exit becomes an
/// error carrying the program's stderr.
pub fn run_compiled_binary(binary_path: &Path) -> Result<String> {
    let output = Command::new(binary_path)
        .output()
        .context("Running compiled program")?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("Compiled program failed: {stderr}");
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

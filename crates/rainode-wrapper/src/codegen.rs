//! Assembles the wrapper JavaScript from the protocol constants and the
//! script source. Sections mirror the runtime order: console overrides,
//! host facade, module load, execution handlers, mode dispatch.

use rainode_protocol::tags;

use crate::ScriptSource;

pub(crate) fn generate(source: &ScriptSource) -> String {
    let mut out = String::with_capacity(8 * 1024);
    out.push_str("(function(){\n");
    out.push_str(&console_overrides());
    out.push_str(&host_facade());
    out.push_str(&module_loader(source));
    out.push_str(&execution_handlers());
    out.push_str(&mode_dispatch());
    out.push_str("})();\n");
    out
}

fn console_overrides() -> String {
    format!(
        r"  // Route console output onto the tagged protocol lines.
  console.log = (...args) => process.stdout.write('{notice}' + args.join(' ') + '\n');
  console.info = console.log;
  console.warn = (...args) => process.stdout.write('{warning}' + args.join(' ') + '\n');
  console.debug = (...args) => process.stdout.write('{debug}' + args.join(' ') + '\n');
  console.error = (...args) => process.stderr.write('{error}' + args.join(' ') + '\n');

",
        notice = tags::LOG_NOTICE,
        warning = tags::LOG_WARNING,
        debug = tags::LOG_DEBUG,
        error = tags::LOG_ERROR,
    )
}

fn host_facade() -> String {
    let mut out = String::new();

    // Synchronous, bounded line read from the host. Also used by the
    // persistent command loop, relying on the strict request/response
    // ordering the host guarantees.
    out.push_str(
        r"  const fs = require('fs');

  function readLineFromHost() {
    const buf = Buffer.alloc(1);
    let line = '';
    for (;;) {
      let n = 0;
      try {
        n = fs.readSync(process.stdin.fd, buf, 0, 1, null);
      } catch (e) {
        if (e.code === 'EAGAIN' || e.code === 'EWOULDBLOCK') continue;
        return line.length ? line : null;
      }
      if (n === 0) return line.length ? line : null;
      const ch = buf.toString('utf8');
      if (ch === '\n') return line;
      if (ch !== '\r') line += ch;
    }
  }

  function hostRequest(tag, args) {
    try {
      process.stdout.write(tag + (args.length ? args.join('|') : '') + '\n');
      const reply = readLineFromHost();
      return reply === null ? '' : reply;
    } catch (e) {
      console.error('host request failed: ' + e.message);
      return '';
    }
  }

  function hostRequestNumber(tag, args, defValue) {
    const parsed = parseFloat(hostRequest(tag, args));
    return isNaN(parsed) ? defValue : parsed;
  }

  function hostRequestInt(tag, args, defValue) {
    const parsed = parseInt(hostRequest(tag, args), 10);
    return isNaN(parsed) ? defValue : parsed;
  }

",
    );

    out.push_str(&format!(
        r"  global.RM = {{
    Execute: (command) => process.stdout.write('{exec}' + command + '\n'),
    GetVariable: (name, defaultValue = '') => hostRequest('{get_var}', [name, defaultValue]),
    ReadString: (option, defValue = '') => hostRequest('{read_str}', [option, defValue]),
    ReadStringFromSection: (section, option, defValue = '') =>
      hostRequest('{read_str_sec}', [section, option, defValue]),
    ReadDouble: (option, defValue = 0.0) =>
      hostRequestNumber('{read_dbl}', [option, defValue], defValue),
    ReadDoubleFromSection: (section, option, defValue = 0.0) =>
      hostRequestNumber('{read_dbl_sec}', [section, option, defValue], defValue),
    ReadInt: (option, defValue = 0) =>
      hostRequestInt('{read_int}', [option, defValue], defValue),
    ReadIntFromSection: (section, option, defValue = 0) =>
      hostRequestInt('{read_int_sec}', [section, option, defValue], defValue),
    GetMeasureName: () => hostRequest('{get_measure}', []),
    GetSkinName: () => hostRequest('{get_skin_name}', []),
    GetSkin: () => hostRequest('{get_skin}', []),
    GetSkinWindow: () => hostRequest('{get_skin_window}', [])
  }};
  const RM = global.RM;

",
        exec = tags::EXECUTE,
        get_var = tags::GET_VARIABLE,
        read_str = tags::READ_STRING,
        read_str_sec = tags::READ_STRING_FROM_SECTION,
        read_dbl = tags::READ_DOUBLE,
        read_dbl_sec = tags::READ_DOUBLE_FROM_SECTION,
        read_int = tags::READ_INT,
        read_int_sec = tags::READ_INT_FROM_SECTION,
        get_measure = tags::GET_MEASURE_NAME,
        get_skin_name = tags::GET_SKIN_NAME,
        get_skin = tags::GET_SKIN,
        get_skin_window = tags::GET_SKIN_WINDOW,
    ));

    out
}

fn module_loader(source: &ScriptSource) -> String {
    match source {
        ScriptSource::File(path) => {
            let escaped = path
                .to_string_lossy()
                .replace('\\', "\\\\")
                .replace('\'', "\\'");
            format!(
                r"  // Load the user script exactly once per process lifetime.
  let scriptModule = null;
  try {{
    scriptModule = require('{escaped}');
  }} catch (e) {{
    console.error('Script loading error: ' + (e && e.stack ? e.stack : e));
    scriptModule = {{}};
  }}

"
            )
        }
        ScriptSource::Inline(lines) => {
            let script = lines.join("\n");
            format!(
                r"  // Compile inline source in a module-like context with require
  // support; bare top-level function declarations become exports.
  let scriptModule = null;
  try {{
    const Module = require('module');
    const path = require('path');
    const moduleObj = new Module();
    moduleObj.filename = __filename;
    moduleObj.paths = Module._nodeModulePaths(process.cwd());
    const scriptFunction = new Function(
      'module', 'exports', 'require', '__filename', '__dirname', 'RM', 'global', 'process', 'console',
      `
{script}

      if (typeof initialize !== 'undefined') module.exports.initialize = initialize;
      if (typeof update !== 'undefined') module.exports.update = update;
      for (let key in this) {{
        if (typeof this[key] === 'function' && key !== 'initialize' && key !== 'update') {{
          module.exports[key] = this[key];
        }}
      }}
      `
    );
    scriptFunction.call(
      {{}},
      moduleObj,
      moduleObj.exports,
      moduleObj.require.bind(moduleObj),
      moduleObj.filename,
      path.dirname(moduleObj.filename),
      RM,
      global,
      process,
      console
    );
    scriptModule = moduleObj.exports;
  }} catch (e) {{
    console.error('Inline script compilation error: ' + (e && e.stack ? e.stack : e));
    scriptModule = {{}};
  }}

"
            )
        }
    }
}

fn execution_handlers() -> String {
    let mut out = String::new();

    out.push_str(
        r"  let lastResult = '';

  async function invokeExport(name) {
    const res = await Promise.resolve(scriptModule[name]());
    return res === undefined || res === null ? '' : String(res);
  }

  function parseArgList(text) {
    const args = [];
    let current = '';
    let quote = null;
    for (let i = 0; i < text.length; i++) {
      const c = text[i];
      if (quote) {
        if (c === '\\' && i + 1 < text.length) { current += c + text[++i]; continue; }
        current += c;
        if (c === quote) quote = null;
      } else if (c === '\x22' || c === '\x27') {
        quote = c;
        current += c;
      } else if (c === ',') {
        args.push(current.trim());
        current = '';
      } else {
        current += c;
      }
    }
    if (current.trim().length) args.push(current.trim());
    return args.map(decodeArg);
  }

  function decodeArg(tok) {
    const first = tok[0];
    const last = tok[tok.length - 1];
    if (tok.length >= 2 && first === last && (first === '\x22' || first === '\x27')) {
      return tok.slice(1, -1).replace(/\\(.)/g, (s, c) =>
        c === 'n' ? '\n' : c === 'r' ? '\r' : c === 't' ? '\t' : c);
    }
    if (tok === 'true') return true;
    if (tok === 'false') return false;
    if (tok === 'null') return null;
    if (tok === 'undefined') return undefined;
    const num = Number(tok);
    if (tok.length && !isNaN(num)) return num;
    return tok;
  }

",
    );

    out.push_str(&format!(
        r"  async function runInit() {{
    try {{
      if (scriptModule && typeof scriptModule.initialize === 'function') {{
        lastResult = await invokeExport('initialize');
      }}
      process.stdout.write('{init_result}' + lastResult + '\n');
    }} catch (e) {{
      console.error('Initialize function error: ' + (e && e.stack ? e.stack : e));
      process.stdout.write('{init_result}' + lastResult + '\n');
    }}
  }}

  async function runUpdate() {{
    try {{
      if (scriptModule && typeof scriptModule.update === 'function') {{
        lastResult = await invokeExport('update');
      }}
      // No update export: report the last known state.
      process.stdout.write('{update_result}' + lastResult + '\n');
    }} catch (e) {{
      console.error('Update function error: ' + (e && e.stack ? e.stack : e));
      process.stdout.write('{update_result}' + lastResult + '\n');
    }}
  }}

  async function runCustom(expr) {{
    try {{
      let result;
      const m = /^([A-Za-z_$][A-Za-z0-9_$]*)\s*\((.*)\)$/.exec(expr.trim());
      if (m && scriptModule && typeof scriptModule[m[1]] === 'function') {{
        result = await Promise.resolve(scriptModule[m[1]](...parseArgList(m[2])));
      }} else {{
        // Dotted or otherwise complex call forms fall back to evaluation
        // against the module object only.
        result = await Promise.resolve(eval('scriptModule.' + expr));
      }}
      lastResult = result === undefined || result === null ? '' : String(result);
      process.stdout.write('{custom_result}' + lastResult + '\n');
    }} catch (e) {{
      console.error('Custom function error: ' + (e && e.stack ? e.stack : e));
      process.stdout.write('{custom_result}' + lastResult + '\n');
    }}
  }}

",
        init_result = tags::INIT_RESULT,
        update_result = tags::UPDATE_RESULT,
        custom_result = tags::CUSTOM_RESULT,
    ));

    out
}

fn mode_dispatch() -> String {
    r"  async function dispatchCommand(command) {
    if (command === 'init') {
      await runInit();
    } else if (command.startsWith('custom ')) {
      await runCustom(command.slice(7).trim());
    } else {
      await runUpdate();
    }
  }

  async function runPersistent() {
    for (;;) {
      const command = readLineFromHost();
      if (command === null) return;
      const trimmed = command.trim();
      if (!trimmed.length) continue;
      await dispatchCommand(trimmed);
    }
  }

  const mode = process.argv[2] || 'update';
  const customCall = process.argv[3] || '';

  if (mode === 'persistent') {
    runPersistent();
  } else if (mode === 'init') {
    runInit();
  } else if (mode === 'custom' && customCall) {
    runCustom(customCall);
  } else {
    runUpdate();
  }
"
    .to_string()
}

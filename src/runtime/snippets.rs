//! Lua source loaded into every session before user code runs
//!
//! Chunks owned by the host are named with the `=arc:` prefix so stack
//! inspection can tell them apart from user frames.

/// Name of the function that wraps user code
pub const ENTRYPOINT_NAME: &str = "__arc_entrypoint";

/// Chunk-name prefix shared by every host-provided chunk
pub const HOST_CHUNK_PREFIX: &str = "=arc:";

/// Embed user script text in the entry-point template
///
/// The header shares the first line with the script so line numbers in
/// diagnostics match the user's source.
pub fn wrap_entrypoint(script: &str) -> String {
    format!("local function {ENTRYPOINT_NAME}(...) {script}\nend\nreturn {ENTRYPOINT_NAME}")
}

/// Baseline and sandbox, run before anything else is installed
///
/// Records shallow copies of `_G`, of every table it holds and of the tables
/// those hold (which covers `package.loaded` and `package.searchers`), plus
/// the string metatable and each recorded table's metatable. Then removes
/// `debug`, the C module loaders and binary chunk loading from the globals.
///
/// Returns the closure that puts every recorded table back as it was, then
/// `debug.getinfo` and `debug.getlocal` for host use (nil when the debug
/// library is absent).
pub const SANDBOX_SNIPPET: &str = r##"
local G, debug, package = _G, debug, package
local next, type, select, rawget, rawset, pcall, error = next, type, select, rawget, rawset, pcall, error
local getmeta = debug and debug.getmetatable or getmetatable
local setmeta = debug and debug.setmetatable or setmetatable

local copies, metas = {}, {}
local function record(t)
  if copies[t] then
    return false
  end
  local copy = {}
  for k, v in next, t do
    copy[k] = v
  end
  copies[t] = copy
  metas[t] = getmeta(t)
  return true
end

record(G)
for _, value in next, G do
  if type(value) == "table" and record(value) then
    for _, inner in next, value do
      if type(inner) == "table" then
        record(inner)
      end
    end
  end
end
local string_meta = getmeta("")
if type(string_meta) == "table" then
  record(string_meta)
end

local function restore()
  for t, copy in next, copies do
    for k in next, t do
      if rawget(copy, k) == nil then
        rawset(t, k, nil)
      end
    end
    for k, v in next, copy do
      rawset(t, k, v)
    end
    pcall(setmeta, t, metas[t])
  end
end

local raw_load, raw_loadfile = load, loadfile
G.load = function(chunk, name, _, ...)
  if select("#", ...) > 0 then
    return raw_load(chunk, name, "t", (...))
  end
  return raw_load(chunk, name, "t")
end
G.loadfile = function(file, _, ...)
  if select("#", ...) > 0 then
    return raw_loadfile(file, "t", (...))
  end
  return raw_loadfile(file, "t")
end
G.dofile = function(file)
  local chunk, err = raw_loadfile(file, "t")
  if not chunk then
    error(err, 2)
  end
  return chunk()
end

if package then
  package.loadlib = nil
  package.cpath = ""
  local searchers = package.searchers
  for i = #searchers, 3, -1 do
    searchers[i] = nil
  end
  package.loaded.debug = nil
end
G.debug = nil

return restore, debug and debug.getinfo, debug and debug.getlocal
"##;

/// `f(template)`: interpolate `{expr}` blocks using the caller's locals,
/// falling back to globals
///
/// Receives `debug.getlocal` captured by [`SANDBOX_SNIPPET`]; without it
/// only globals are visible.
pub const FSTRING_SNIPPET: &str = r#"
local getlocal = ...
local setmetatable, load, pcall, tostring = setmetatable, load, pcall, tostring
local G = _G

return function(template)
  local env = setmetatable({}, { __index = G })
  local index = 1
  while getlocal do
    local name, value = getlocal(2, index)
    if not name then break end
    if name:sub(1, 1) ~= "(" then
      env[name] = value
    end
    index = index + 1
  end

  return (tostring(template):gsub("%b{}", function(block)
    local chunk = load("return " .. block:sub(2, -2), "=arc:f", "t", env)
    if not chunk then
      return block
    end
    local ok, result = pcall(chunk)
    if not ok then
      return block
    end
    return tostring(result)
  end))
end
"#;

/// Host-designated suspension point; receives the default wait
pub const WAIT_SNIPPET: &str = r#"
local default_wait = ...
local yield = coroutine.yield

return function(seconds)
  return yield(seconds or default_wait)
end
"#;

/// `require` searcher over stored macros and approved search paths
///
/// Receives the internal macro-text accessor and the validated path list.
/// The baseline restore removes the searcher and anything it loaded.
pub const REQUIRE_SNIPPET: &str = r#"
local get_macro_text, paths = ...
local load, loadfile, error, ipairs = load, loadfile, error, ipairs
local concat, format, searchpath = table.concat, string.format, package.searchpath

local function searcher(name)
  local body = get_macro_text(name)
  if body then
    local chunk, err = load(body, "=" .. name, "t")
    if not chunk then
      error(format("error loading macro '%s':\n\t%s", name, err), 2)
    end
    return chunk, ":macro:" .. name
  end

  local templates = {}
  for _, dir in ipairs(paths) do
    templates[#templates + 1] = dir .. "/?.lua"
    templates[#templates + 1] = dir .. "/?/init.lua"
  end
  if #templates == 0 then
    return format("no macro '%s'", name)
  end

  local file, searched = searchpath(name, concat(templates, ";"))
  if not file then
    return format("no macro '%s'%s", name, searched or "")
  end
  local chunk, err = loadfile(file, "t")
  if not chunk then
    error(format("error loading module '%s' from file '%s':\n\t%s", name, file, err), 2)
  end
  return chunk, file
end

table.insert(package.searchers, 2, searcher)
"#;

/// Locate the frame a failed coroutine stopped in
///
/// Receives the coroutine and the captured `debug.getinfo`, falling back to
/// the global one. Prefers the innermost user frame, then the innermost host
/// frame.
pub const ERROR_LOCATION_SNIPPET: &str = r#"
local co, getinfo = ...
if co == nil then
  return "Unknown error location"
end
getinfo = getinfo or debug.getinfo

local fallback
local level = 0
while true do
  local info = getinfo(co, level, "Sln")
  if not info then break end
  if info.what ~= "C" then
    local source = info.source
    local lead = source:sub(1, 1)
    if lead == "@" or lead == "=" then
      source = source:sub(2)
    end
    local line = string.format("Error at %s:%d in function '%s'",
      source, info.currentline, info.name or "(anonymous)")
    if info.source:sub(1, 5) ~= "=arc:" then
      return line
    end
    fallback = fallback or line
  end
  level = level + 1
end
return fallback or "Unknown error location"
"#;
